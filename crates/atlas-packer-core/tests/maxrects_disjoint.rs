use atlas_packer_core::config::{MaxRectsHeuristic, SortOrder};
use atlas_packer_core::model::Rect;
use atlas_packer_core::packer::{Bin, BinOptions, PackRect, pack_rects};
use rand::{Rng, SeedableRng};

const HEURISTICS: [MaxRectsHeuristic; 5] = [
    MaxRectsHeuristic::BestShortSideFit,
    MaxRectsHeuristic::BestLongSideFit,
    MaxRectsHeuristic::BestAreaFit,
    MaxRectsHeuristic::BottomLeft,
    MaxRectsHeuristic::ContactPoint,
];

fn assert_valid_bin(bin: &Bin, rects: &[PackRect<'_>]) {
    let bounds = Rect::new(0, 0, bin.width(), bin.height());
    let placed = bin.placed();
    for p in placed {
        assert!(bounds.contains(&p.rect()), "{:?} outside {:?}", p, bounds);
        let src = &rects[p.id];
        let dims = if p.rotated { (src.h, src.w) } else { (src.w, src.h) };
        assert_eq!((p.w, p.h), dims, "stored size of {}", src.key);
    }
    for i in 0..placed.len() {
        for j in (i + 1)..placed.len() {
            assert!(
                !placed[i].rect().intersects(&placed[j].rect()),
                "{:?} overlaps {:?}",
                placed[i],
                placed[j]
            );
        }
    }
    for fr in bin.free_rects() {
        assert!(bounds.contains(fr));
        for p in placed {
            assert!(!fr.intersects(&p.rect()), "free {:?} covers {:?}", fr, p);
        }
    }
}

fn random_sizes(seed: u64, count: usize, max_side: u32) -> Vec<(String, u32, u32)> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            (
                format!("r{i}"),
                rng.gen_range(1..=max_side),
                rng.gen_range(1..=max_side),
            )
        })
        .collect()
}

#[test]
fn random_sets_stay_in_bounds_and_disjoint() {
    for seed in [1u64, 7, 42, 1337] {
        let sizes = random_sizes(seed, 120, 48);
        let rects: Vec<PackRect<'_>> = sizes
            .iter()
            .map(|(k, w, h)| PackRect::new(k, *w, *h))
            .collect();
        for heuristic in HEURISTICS {
            for allow_rotation in [false, true] {
                let opts = BinOptions {
                    heuristic,
                    ..BinOptions::new(128, 128, allow_rotation)
                };
                let bins = pack_rects(&rects, &opts, SortOrder::AreaDesc).unwrap();
                let total: usize = bins.iter().map(|b| b.placed().len()).sum();
                assert_eq!(total, rects.len(), "{heuristic:?} lost rects");
                for bin in &bins {
                    assert!(!bin.is_empty());
                    assert_valid_bin(bin, &rects);
                }
            }
        }
    }
}

#[test]
fn border_keeps_placements_off_the_edges() {
    let sizes = random_sizes(99, 40, 20);
    let rects: Vec<PackRect<'_>> = sizes
        .iter()
        .map(|(k, w, h)| PackRect::new(k, *w, *h))
        .collect();
    let opts = BinOptions {
        border: 3,
        ..BinOptions::new(64, 64, true)
    };
    let bins = pack_rects(&rects, &opts, SortOrder::AreaDesc).unwrap();
    let inner = Rect::new(3, 3, 58, 58);
    for bin in &bins {
        for p in bin.placed() {
            assert!(inner.contains(&p.rect()));
        }
    }
}

#[test]
fn every_placed_id_appears_once() {
    let sizes = random_sizes(5, 60, 30);
    let rects: Vec<PackRect<'_>> = sizes
        .iter()
        .map(|(k, w, h)| PackRect::new(k, *w, *h))
        .collect();
    let bins = pack_rects(&rects, &BinOptions::new(64, 64, true), SortOrder::AreaDesc).unwrap();
    let mut ids: Vec<usize> = bins
        .iter()
        .flat_map(|b| b.placed().iter().map(|p| p.id))
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..rects.len()).collect::<Vec<_>>());
}

#[test]
fn rotation_is_used_only_when_needed_to_fit() {
    let rects = [PackRect::new("tall", 10, 40)];
    let no_rot = pack_rects(&rects, &BinOptions::new(40, 10, false), SortOrder::AreaDesc);
    assert!(no_rot.is_err());
    let bins = pack_rects(&rects, &BinOptions::new(40, 10, true), SortOrder::AreaDesc).unwrap();
    let p = bins[0].placed()[0];
    assert!(p.rotated);
    assert_eq!((p.x, p.y, p.w, p.h), (0, 0, 40, 10));
}

#[test]
fn square_rects_are_never_rotated() {
    let rects = [PackRect::new("a", 16, 16), PackRect::new("b", 16, 16)];
    let bins = pack_rects(&rects, &BinOptions::new(32, 16, true), SortOrder::AreaDesc).unwrap();
    assert!(bins[0].placed().iter().all(|p| !p.rotated));
}
