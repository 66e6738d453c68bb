use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use atlas_packer_core::config::{DecodeErrorPolicy, MaxRectsHeuristic, SortOrder};
use atlas_packer_core::{
    AtlasError, PackerConfig, SourceImage, pack_images, pack_layout, write_atlas,
};
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use image::ImageReader;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "atlas-packer",
    about = "Pack images into texture atlas pages",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack images into atlas pages (PNG + JSON descriptors)
    Pack(PackArgs),
    /// Layout-only: compute placements and write page records as JSON (no PNGs)
    Layout(PackArgs),
    /// Pack once and print timing + occupancy
    Bench(PackArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    // Input/Output
    /// Input file or directory
    #[arg(help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    out_dir: PathBuf,
    /// Atlas base name (name.png/name.json, or name-<i>.png/json for several pages)
    #[arg(short, long, default_value = "atlas", help_heading = "Input/Output")]
    name: String,
    /// YAML config file path (values in the file override command-line options)
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only files matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Files matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // Layout
    /// Max page width
    #[arg(long, default_value_t = 1024, help_heading = "Layout")]
    max_width: u32,
    /// Max page height
    #[arg(long, default_value_t = 1024, help_heading = "Layout")]
    max_height: u32,
    /// Force output size to max_width/max_height
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    force_max_dimensions: bool,
    /// Resize page dims to power of two
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    pow2: bool,
    /// Force square page
    #[arg(long, default_value_t = false, help_heading = "Layout")]
    square: bool,
    /// Sort order: area_desc|max_side_desc|name_asc|none
    #[arg(long, default_value = "area_desc", help_heading = "Layout")]
    sort_order: String,
    /// MaxRects heuristic: bssf|blsf|baf|bl|cp
    #[arg(long, default_value = "bssf", help_heading = "Layout")]
    heuristic: String,

    // Image Processing
    /// Allow rotation (90deg clockwise)
    #[arg(long, default_value_t = true, action=ArgAction::Set, help_heading = "Image Processing")]
    allow_rotation: bool,
    /// Border padding (around entire page)
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    border_padding: u32,
    /// Padding between regions
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    texture_padding: u32,
    /// Extrude edge pixels around each region
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    extrude: u32,
    /// Crop transparent borders before packing
    #[arg(long, default_value_t = false, help_heading = "Image Processing")]
    trim: bool,
    /// Alpha at or below this value counts as transparent when trimming
    #[arg(long, default_value_t = 0, help_heading = "Image Processing")]
    trim_threshold: u8,
    /// Bleed opaque colors into transparent pixels
    #[arg(long, default_value_t = true, action=ArgAction::Set, help_heading = "Image Processing")]
    bleed: bool,
    /// Number of bleed iterations
    #[arg(long, default_value_t = 2, help_heading = "Image Processing")]
    bleed_iterations: u32,
    /// Unreadable images: skip | abort
    #[arg(long, default_value = "skip", help_heading = "Image Processing")]
    on_decode_error: String,

    // Export
    /// Export packing stats (JSON) to this file
    #[arg(long, help_heading = "Export")]
    export_stats: Option<PathBuf>,
    /// Print the merged configuration (after CLI/YAML) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
    /// Dry run: compute layout and stats but do not write files
    #[arg(long, default_value_t = false, help_heading = "Export")]
    dry_run: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    let progress = cli.progress && !cli.quiet;
    match &cli.command {
        Commands::Pack(args) => run_pack(args, progress),
        Commands::Layout(args) => run_layout(args, progress),
        Commands::Bench(args) => run_bench(args),
    }
}

fn run_pack(args: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let cfg = build_config(args)?;
    if args.print_config {
        return print_config(&cfg, &args.print_config_format);
    }

    let paths = gather_paths(&args.input, &args.include, &args.exclude)?;
    let inputs = register_sources(&args.input, &paths, show_progress)?;
    info!(count = inputs.len(), "registered input images");

    let out = pack_images(inputs, cfg)?;
    let stats = out.stats();
    info!(
        pages = stats.num_pages,
        regions = stats.num_regions,
        skipped = out.skipped.len(),
        occupancy = format!("{:.2}%", stats.occupancy * 100.0),
        "packed"
    );

    if !args.dry_run {
        let written = write_atlas(&args.out_dir, &args.name, &out)
            .with_context(|| format!("write atlas into {}", args.out_dir.display()))?;
        for path in &written {
            info!(path = %path.display(), "written");
        }
    }
    if let Some(stats_path) = &args.export_stats {
        write_json(stats_path, &serde_json::to_value(stats)?)?;
    }
    Ok(())
}

fn run_layout(args: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let cfg = build_config(args)?;
    if args.print_config {
        return print_config(&cfg, &args.print_config_format);
    }
    let paths = gather_paths(&args.input, &args.include, &args.exclude)?;
    let bar = progress_bar(paths.len(), "probing", show_progress)?;
    let mut items: Vec<(String, u32, u32)> = Vec::with_capacity(paths.len());
    for p in &paths {
        if let Some(b) = &bar {
            b.set_message(file_label(p));
        }
        match image::image_dimensions(p) {
            Ok((w, h)) => items.push((source_key(&args.input, p), w, h)),
            Err(e) => warn!(path = %p.display(), error = %e, "skip image"),
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    let pages = pack_layout(items, cfg)?;
    info!(pages = pages.len(), "layout computed");
    if !args.dry_run {
        fs::create_dir_all(&args.out_dir)
            .with_context(|| format!("create out_dir {}", args.out_dir.display()))?;
        let json_path = args.out_dir.join(format!("{}.layout.json", args.name));
        write_json(&json_path, &serde_json::to_value(&pages)?)?;
        info!(path = %json_path.display(), "layout written");
    }
    if let Some(stats_path) = &args.export_stats {
        let stats = atlas_packer_core::PackStats::from_pages(&pages);
        write_json(stats_path, &serde_json::to_value(stats)?)?;
    }
    Ok(())
}

fn run_bench(args: &PackArgs) -> anyhow::Result<()> {
    let cfg = build_config(args)?;
    let paths = gather_paths(&args.input, &args.include, &args.exclude)?;
    let inputs = register_sources(&args.input, &paths, false)?;
    let count = inputs.len();
    let start = Instant::now();
    let out = pack_images(inputs, cfg)?;
    let elapsed = start.elapsed();
    let stats = out.stats();
    println!(
        "inputs={} pages={} time={} occupancy={:.2}%",
        count,
        stats.num_pages,
        fmt_dur(elapsed),
        stats.occupancy * 100.0
    );
    Ok(())
}

fn fmt_dur(d: Duration) -> String {
    let ms = d.as_secs_f64() * 1000.0;
    if ms < 1000.0 {
        format!("{ms:.1}ms")
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

fn build_config(args: &PackArgs) -> anyhow::Result<PackerConfig> {
    let mut cfg = PackerConfig {
        max_width: args.max_width,
        max_height: args.max_height,
        allow_rotation: args.allow_rotation,
        force_max_dimensions: args.force_max_dimensions,
        border_padding: args.border_padding,
        texture_padding: args.texture_padding,
        extrude: args.extrude,
        trim: args.trim,
        trim_threshold: args.trim_threshold,
        bleed: args.bleed,
        bleed_iterations: args.bleed_iterations,
        power_of_two: args.pow2,
        square: args.square,
        heuristic: parse_heuristic(&args.heuristic)?,
        sort_order: parse_sort_order(&args.sort_order)?,
        on_decode_error: parse_decode_policy(&args.on_decode_error)?,
    };
    if let Some(path) = &args.config {
        let file = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let y: YamlConfig = serde_yaml::from_str(&file)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg = y.merge_into(cfg)?;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn print_config(cfg: &PackerConfig, format: &str) -> anyhow::Result<()> {
    match format {
        "yaml" => println!("{}", serde_yaml::to_string(cfg)?),
        _ => println!("{}", serde_json::to_string_pretty(cfg)?),
    }
    Ok(())
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)
        .with_context(|| format!("write {}", path.display()))
}

fn gather_paths(
    path: &Path,
    include: &[String],
    exclude: &[String],
) -> anyhow::Result<Vec<PathBuf>> {
    let inc_set = build_globset(include)?;
    let exc_set = build_globset(exclude)?;
    let mut list: Vec<PathBuf> = Vec::new();
    if path.is_file() {
        if !should_skip(path, inc_set.as_ref(), exc_set.as_ref()) && is_image(path) {
            list.push(path.to_path_buf());
        }
    } else {
        for entry in WalkDir::new(path)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let p = entry.path();
            if p.is_file() && !should_skip(p, inc_set.as_ref(), exc_set.as_ref()) && is_image(p) {
                list.push(p.to_path_buf());
            }
        }
    }
    Ok(list)
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat).with_context(|| format!("invalid glob '{pat}'"))?);
    }
    Ok(Some(b.build()?))
}

fn should_skip(p: &Path, include: Option<&GlobSet>, exclude: Option<&GlobSet>) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if exclude.is_some_and(|ex| ex.is_match(&s)) {
        return true;
    }
    include.is_some_and(|inc| !inc.is_match(&s))
}

fn is_image(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "png" | "jpg" | "jpeg")
    )
}

/// Region name: path relative to the input root, forward slashes, no extension.
fn source_key(root: &Path, p: &Path) -> String {
    let rel = if root.is_file() {
        Path::new(p.file_name().unwrap_or(p.as_os_str()))
    } else {
        p.strip_prefix(root).unwrap_or(p)
    };
    rel.with_extension("").to_string_lossy().replace('\\', "/")
}

fn file_label(p: &Path) -> String {
    p.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

fn progress_bar(len: usize, what: &str, show: bool) -> anyhow::Result<Option<ProgressBar>> {
    if !show {
        return Ok(None);
    }
    let b = ProgressBar::new(len as u64);
    b.set_style(ProgressStyle::with_template(&format!(
        "{{spinner:.green}} {what} {{pos}}/{{len}} [{{elapsed_precise}}] {{wide_msg}}"
    ))?);
    Ok(Some(b))
}

/// Reads each image header for its size and defers pixel decoding to the packer.
fn register_sources(
    root: &Path,
    paths: &[PathBuf],
    show_progress: bool,
) -> anyhow::Result<Vec<SourceImage>> {
    let bar = progress_bar(paths.len(), "probing", show_progress)?;
    let mut list = Vec::with_capacity(paths.len());
    for p in paths {
        if let Some(b) = &bar {
            b.set_message(file_label(p));
        }
        match image::image_dimensions(p) {
            Ok((w, h)) => {
                let key = source_key(root, p);
                let path = p.clone();
                list.push(SourceImage::deferred(key.clone(), w, h, move || {
                    decode_rgba(&path).map_err(|reason| AtlasError::Decode { key, reason })
                }));
            }
            Err(e) => warn!(path = %p.display(), error = %e, "skip image"),
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    Ok(list)
}

fn decode_rgba(p: &Path) -> Result<image::RgbaImage, String> {
    let reader = ImageReader::open(p)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| e.to_string())?;
    reader
        .decode()
        .map(|img| img.to_rgba8())
        .map_err(|e| e.to_string())
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

/// Optional YAML config; present keys override the command-line values.
#[derive(Debug, Deserialize, Default)]
struct YamlConfig {
    max_width: Option<u32>,
    max_height: Option<u32>,
    allow_rotation: Option<bool>,
    force_max_dimensions: Option<bool>,
    border_padding: Option<u32>,
    texture_padding: Option<u32>,
    extrude: Option<u32>,
    trim: Option<bool>,
    trim_threshold: Option<u8>,
    bleed: Option<bool>,
    bleed_iterations: Option<u32>,
    power_of_two: Option<bool>,
    square: Option<bool>,
    heuristic: Option<String>,
    sort_order: Option<String>,
    on_decode_error: Option<String>,
}

impl YamlConfig {
    fn merge_into(self, mut cfg: PackerConfig) -> anyhow::Result<PackerConfig> {
        if let Some(v) = self.max_width {
            cfg.max_width = v;
        }
        if let Some(v) = self.max_height {
            cfg.max_height = v;
        }
        if let Some(v) = self.allow_rotation {
            cfg.allow_rotation = v;
        }
        if let Some(v) = self.force_max_dimensions {
            cfg.force_max_dimensions = v;
        }
        if let Some(v) = self.border_padding {
            cfg.border_padding = v;
        }
        if let Some(v) = self.texture_padding {
            cfg.texture_padding = v;
        }
        if let Some(v) = self.extrude {
            cfg.extrude = v;
        }
        if let Some(v) = self.trim {
            cfg.trim = v;
        }
        if let Some(v) = self.trim_threshold {
            cfg.trim_threshold = v;
        }
        if let Some(v) = self.bleed {
            cfg.bleed = v;
        }
        if let Some(v) = self.bleed_iterations {
            cfg.bleed_iterations = v;
        }
        if let Some(v) = self.power_of_two {
            cfg.power_of_two = v;
        }
        if let Some(v) = self.square {
            cfg.square = v;
        }
        if let Some(v) = self.heuristic {
            cfg.heuristic = parse_heuristic(&v)?;
        }
        if let Some(v) = self.sort_order {
            cfg.sort_order = parse_sort_order(&v)?;
        }
        if let Some(v) = self.on_decode_error {
            cfg.on_decode_error = parse_decode_policy(&v)?;
        }
        Ok(cfg)
    }
}

fn parse_heuristic(s: &str) -> anyhow::Result<MaxRectsHeuristic> {
    s.parse()
        .map_err(|_| anyhow!("unknown maxrects heuristic: {}", s))
}

fn parse_sort_order(s: &str) -> anyhow::Result<SortOrder> {
    s.parse().map_err(|_| anyhow!("unknown sort order: {}", s))
}

fn parse_decode_policy(s: &str) -> anyhow::Result<DecodeErrorPolicy> {
    s.parse()
        .map_err(|_| anyhow!("unknown decode error policy: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_key_is_relative_without_extension() {
        let root = Path::new("assets");
        assert_eq!(
            source_key(root, Path::new("assets/ui/button.png")),
            "ui/button"
        );
    }

    #[test]
    fn yaml_overrides_command_line_values() {
        let y: YamlConfig =
            serde_yaml::from_str("max_width: 256\nheuristic: baf\nbleed: false\ntrim: true\n")
                .unwrap();
        let cfg = y.merge_into(PackerConfig::default()).unwrap();
        assert_eq!(cfg.max_width, 256);
        assert!(cfg.trim);
        assert_eq!(cfg.trim_threshold, 0);
        assert_eq!(cfg.max_height, 1024);
        assert_eq!(cfg.heuristic, MaxRectsHeuristic::BestAreaFit);
        assert!(!cfg.bleed);
    }
}
