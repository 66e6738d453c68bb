use super::PlacedRect;
use crate::config::MaxRectsHeuristic;
use crate::model::Rect;

/// One bin of the MaxRects packer.
///
/// Free space is tracked as a list of maximal (possibly overlapping) free
/// rectangles; placements are appended to `placed` and never removed. Both
/// lists are plain vectors addressed by index.
#[derive(Debug, Clone)]
pub struct Bin {
    width: u32,
    height: u32,
    border: u32,
    allow_rotation: bool,
    heuristic: MaxRectsHeuristic,
    free: Vec<Rect>,
    placed: Vec<PlacedRect>,
    // reused by `place` so inserting does not allocate once warmed up
    scratch: Vec<Rect>,
}

/// Candidate score; lexicographically smaller is better.
type Score = (i64, i64, u32, u32, bool);

impl Bin {
    pub fn new(
        width: u32,
        height: u32,
        border: u32,
        allow_rotation: bool,
        heuristic: MaxRectsHeuristic,
    ) -> Self {
        let inner = Self::inner_rect(width, height, border);
        let free = if inner.is_empty() {
            Vec::new()
        } else {
            vec![inner]
        };
        Self {
            width,
            height,
            border,
            allow_rotation,
            heuristic,
            free,
            placed: Vec::new(),
            scratch: Vec::new(),
        }
    }

    fn inner_rect(width: u32, height: u32, border: u32) -> Rect {
        let pad = border.saturating_mul(2);
        Rect::new(
            border,
            border,
            width.saturating_sub(pad),
            height.saturating_sub(pad),
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Placements in insertion order.
    pub fn placed(&self) -> &[PlacedRect] {
        &self.placed
    }

    pub fn free_rects(&self) -> &[Rect] {
        &self.free
    }

    pub fn free_list_len(&self) -> usize {
        self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty()
    }

    /// Whether a `w x h` rect could be placed in an empty bin of this size.
    pub fn admits(&self, w: u32, h: u32) -> bool {
        let inner = Self::inner_rect(self.width, self.height, self.border);
        (w <= inner.w && h <= inner.h) || (self.allow_rotation && h <= inner.w && w <= inner.h)
    }

    /// Bounding box of every placement (empty rect when nothing is placed).
    pub fn used_bounds(&self) -> Rect {
        self.placed
            .iter()
            .fold(Rect::default(), |acc, p| acc.union(&p.rect()))
    }

    /// Places a `w x h` rect tagged with `id`. Returns `None` if no free rect admits it.
    pub fn insert(&mut self, id: usize, w: u32, h: u32) -> Option<PlacedRect> {
        if w == 0 || h == 0 {
            return None;
        }
        let (node, rotated) = self.find_position(w, h)?;
        self.place(&node);
        let placed = PlacedRect {
            id,
            x: node.x,
            y: node.y,
            w: node.w,
            h: node.h,
            rotated,
        };
        self.placed.push(placed);
        Some(placed)
    }

    /// Returns the best slot for a `w x h` rect and whether it is rotated.
    pub fn find_position(&self, w: u32, h: u32) -> Option<(Rect, bool)> {
        let mut best: Option<(Score, Rect, bool)> = None;
        let mut consider = |score: Score, rect: Rect, rotated: bool| {
            if best.as_ref().is_none_or(|(s, _, _)| score < *s) {
                best = Some((score, rect, rotated));
            }
        };
        for fr in &self.free {
            if fr.w >= w && fr.h >= h {
                let (s1, s2) = self.score(fr, w, h);
                consider((s1, s2, fr.y, fr.x, false), Rect::new(fr.x, fr.y, w, h), false);
            }
            if self.allow_rotation && w != h && fr.w >= h && fr.h >= w {
                let (s1, s2) = self.score(fr, h, w);
                consider((s1, s2, fr.y, fr.x, true), Rect::new(fr.x, fr.y, h, w), true);
            }
        }
        best.map(|(_, rect, rotated)| (rect, rotated))
    }

    fn score(&self, fr: &Rect, w: u32, h: u32) -> (i64, i64) {
        let leftover_h = fr.w as i64 - w as i64;
        let leftover_v = fr.h as i64 - h as i64;
        let short_fit = leftover_h.min(leftover_v);
        let long_fit = leftover_h.max(leftover_v);
        let area_fit = fr.area() as i64 - (w as i64) * (h as i64);
        match self.heuristic {
            MaxRectsHeuristic::BestShortSideFit => (short_fit, area_fit),
            MaxRectsHeuristic::BestLongSideFit => (long_fit, short_fit),
            MaxRectsHeuristic::BestAreaFit => (area_fit, short_fit),
            MaxRectsHeuristic::BottomLeft => ((fr.y + h) as i64, fr.x as i64),
            MaxRectsHeuristic::ContactPoint => {
                // maximize contact: negate for minimization
                let contact = self.contact_point_score(fr.x, fr.y, w, h);
                (-(contact as i64), area_fit)
            }
        }
    }

    fn contact_point_score(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let node = Rect::new(x, y, w, h);
        let inner = Self::inner_rect(self.width, self.height, self.border);
        let mut score = 0u64;
        if node.x == inner.x || node.right_ex() == inner.right_ex() {
            score += node.h as u64;
        }
        if node.y == inner.y || node.bottom_ex() == inner.bottom_ex() {
            score += node.w as u64;
        }
        for p in &self.placed {
            let u = p.rect();
            if node.x == u.right_ex() || u.x == node.right_ex() {
                score += overlap_1d(node.y, node.bottom_ex(), u.y, u.bottom_ex()) as u64;
            }
            if node.y == u.bottom_ex() || u.y == node.bottom_ex() {
                score += overlap_1d(node.x, node.right_ex(), u.x, u.right_ex()) as u64;
            }
        }
        score
    }

    /// Splits every free rect overlapping `node` and prunes the result.
    fn place(&mut self, node: &Rect) {
        let mut pieces = std::mem::take(&mut self.scratch);
        pieces.clear();
        let mut i = 0usize;
        while i < self.free.len() {
            let fr = self.free[i];
            if fr.intersects(node) {
                self.free.swap_remove(i);
                split_free_node(fr, node, &mut pieces);
            } else {
                i += 1;
            }
        }
        // Old free rects are mutually maximal and each piece lies inside a removed
        // one, so only pieces can be dominated.
        pieces.retain(|p| !p.is_empty() && !self.free.iter().any(|of| of.contains(p)));
        prune_within(&mut pieces);
        self.free.extend(pieces.drain(..));
        self.scratch = pieces;
    }

    /// Enlarges the bin to `new_width x new_height`, keeping every placement.
    ///
    /// Free rects touching the old right/bottom edge are stretched into the new
    /// space and full-length strips are added for the rest.
    pub fn grow(&mut self, new_width: u32, new_height: u32) {
        let new_width = new_width.max(self.width);
        let new_height = new_height.max(self.height);
        if new_width == self.width && new_height == self.height {
            return;
        }
        let old_inner = Self::inner_rect(self.width, self.height, self.border);
        let new_inner = Self::inner_rect(new_width, new_height, self.border);
        let (old_rx, old_by) = (old_inner.right_ex(), old_inner.bottom_ex());
        let (new_rx, new_by) = (new_inner.right_ex(), new_inner.bottom_ex());

        for fr in self.free.iter_mut() {
            if fr.right_ex() == old_rx {
                fr.w = new_rx - fr.x;
            }
            if fr.bottom_ex() == old_by {
                fr.h = new_by - fr.y;
            }
        }
        if new_rx > old_rx {
            self.free.push(Rect::new(
                old_rx,
                new_inner.y,
                new_rx - old_rx,
                new_inner.h,
            ));
        }
        if new_by > old_by {
            self.free.push(Rect::new(
                new_inner.x,
                old_by,
                new_inner.w,
                new_by - old_by,
            ));
        }
        self.free.retain(|r| !r.is_empty());
        prune_within(&mut self.free);
        self.width = new_width;
        self.height = new_height;
    }
}

/// Pushes the up-to-four maximal strips of `fr` left uncovered by `node`.
fn split_free_node(fr: Rect, node: &Rect, out: &mut Vec<Rect>) {
    let fr_x2 = fr.right_ex();
    let fr_y2 = fr.bottom_ex();
    let n_x2 = node.right_ex();
    let n_y2 = node.bottom_ex();

    // left
    if node.x > fr.x && node.x < fr_x2 {
        out.push(Rect::new(fr.x, fr.y, node.x - fr.x, fr.h));
    }
    // right
    if n_x2 < fr_x2 {
        out.push(Rect::new(n_x2, fr.y, fr_x2 - n_x2, fr.h));
    }
    // top
    if node.y > fr.y && node.y < fr_y2 {
        out.push(Rect::new(fr.x, fr.y, fr.w, node.y - fr.y));
    }
    // bottom
    if n_y2 < fr_y2 {
        out.push(Rect::new(fr.x, n_y2, fr.w, fr_y2 - n_y2));
    }
}

/// Removes every rect contained in another rect of the same list.
fn prune_within(v: &mut Vec<Rect>) {
    let mut i = 0;
    while i < v.len() {
        let a = v[i];
        let dominated = v
            .iter()
            .enumerate()
            .any(|(j, b)| j != i && b.contains(&a));
        if dominated {
            v.swap_remove(i);
        } else {
            i += 1;
        }
    }
}

fn overlap_1d(a1: u32, a2: u32, b1: u32, b2: u32) -> u32 {
    let start = a1.max(b1);
    let end = a2.min(b2);
    end.saturating_sub(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_produces_right_and_bottom_for_corner_placement() {
        let mut out = Vec::new();
        split_free_node(Rect::new(0, 0, 64, 64), &Rect::new(0, 0, 32, 16), &mut out);
        assert_eq!(out, vec![Rect::new(32, 0, 32, 64), Rect::new(0, 16, 64, 48)]);
    }

    #[test]
    fn prune_keeps_one_of_duplicate_rects() {
        let mut v = vec![
            Rect::new(0, 0, 10, 10),
            Rect::new(0, 0, 10, 10),
            Rect::new(2, 2, 4, 4),
        ];
        prune_within(&mut v);
        assert_eq!(v, vec![Rect::new(0, 0, 10, 10)]);
    }

    #[test]
    fn grow_extends_free_space_without_moving_placements() {
        let mut bin = Bin::new(32, 32, 0, false, MaxRectsHeuristic::BestShortSideFit);
        let first = bin.insert(0, 32, 32).expect("fits exactly");
        assert!(bin.find_position(32, 32).is_none());
        bin.grow(64, 64);
        assert_eq!(bin.placed()[0], first);
        let second = bin.insert(1, 32, 64).expect("right strip after growth");
        assert_eq!((second.x, second.y), (32, 0));
        assert!(bin.insert(2, 32, 32).is_some());
    }
}
