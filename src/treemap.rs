/// Rectangle structure for treemap layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn short_side(&self) -> f32 {
        self.width.min(self.height)
    }

    pub fn long_side(&self) -> f32 {
        self.width.max(self.height)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Non-positive width or height.
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Half-open containment: left/top edges inside, right/bottom edges outside.
    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }
}

/// Squarified Treemap Algorithm (Bruls, Huizing, van Wijk)
pub struct SquarifiedTreemap;

impl SquarifiedTreemap {
    /// Partition `container` into one rectangle per entry of `areas`, in input order.
    ///
    /// Areas are expected to already be scaled to the container (their sum equal to
    /// `container.area()`); the caller decides their order. Rows run along the longer
    /// side of the remaining rectangle and a row keeps growing while the next area does
    /// not make its worst aspect ratio larger.
    ///
    /// If rounding collapses the remaining rectangle before every area is placed, the
    /// leftovers get zero-size rectangles so the output stays index-aligned.
    pub fn squarify(areas: &[f32], container: Rect) -> Vec<Rect> {
        let mut result = Vec::with_capacity(areas.len());
        let mut remaining = container;
        let mut next = 0usize;

        while next < areas.len() {
            if remaining.is_empty() {
                let corner = Rect::new(remaining.x, remaining.y, 0.0, 0.0);
                result.extend(std::iter::repeat(corner).take(areas.len() - next));
                break;
            }

            let length = remaining.long_side() as f64;
            let first = areas[next].max(0.0) as f64;
            let mut row = RowStats::new(first);
            let mut worst = row.worst_aspect_ratio(length);
            let mut row_end = next + 1;

            while row_end < areas.len() {
                let candidate = row.with(areas[row_end].max(0.0) as f64);
                let candidate_worst = candidate.worst_aspect_ratio(length);
                if !candidate_worst.is_finite() || candidate_worst > worst {
                    break;
                }
                row = candidate;
                worst = candidate_worst;
                row_end += 1;
            }

            remaining = Self::layout_row(&areas[next..row_end], row.total, remaining, &mut result);
            next = row_end;
        }

        result
    }

    /// Place one row against the top (wide container) or left (tall container) edge
    /// and return what is left of the container.
    fn layout_row(row: &[f32], total: f64, container: Rect, result: &mut Vec<Rect>) -> Rect {
        let horizontal = container.width >= container.height;
        let (length, breadth) = if horizontal {
            (container.width, container.height)
        } else {
            (container.height, container.width)
        };

        let row_breadth = if total > 0.0 {
            ((total / length as f64) as f32).min(breadth)
        } else {
            0.0
        };

        let mut offset = 0.0f32;
        let last = row.len().saturating_sub(1);

        for (i, &area) in row.iter().enumerate() {
            let item_length = if total > 0.0 {
                if i == last {
                    // Absorb rounding so the row spans the full side.
                    (length - offset).max(0.0)
                } else {
                    (area.max(0.0) as f64 / total * length as f64) as f32
                }
            } else {
                0.0
            };

            let rect = if horizontal {
                Rect::new(container.x + offset, container.y, item_length, row_breadth)
            } else {
                Rect::new(container.x, container.y + offset, row_breadth, item_length)
            };

            result.push(rect);
            offset += item_length;
        }

        if horizontal {
            Rect::new(
                container.x,
                container.y + row_breadth,
                container.width,
                (container.height - row_breadth).max(0.0),
            )
        } else {
            Rect::new(
                container.x + row_breadth,
                container.y,
                (container.width - row_breadth).max(0.0),
                container.height,
            )
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RowStats {
    total: f64,
    min: f64,
    max: f64,
}

impl RowStats {
    fn new(area: f64) -> Self {
        Self {
            total: area,
            min: area,
            max: area,
        }
    }

    fn with(self, area: f64) -> Self {
        Self {
            total: self.total + area,
            min: self.min.min(area),
            max: self.max.max(area),
        }
    }

    /// Worst over the row of max(side²/area, area/side²), where side is the row's
    /// thickness when laid along `length`. Zero areas and zero lengths are infinite.
    fn worst_aspect_ratio(&self, length: f64) -> f64 {
        if length <= 0.0 || self.total <= 0.0 || self.min <= 0.0 {
            return f64::INFINITY;
        }
        let side = self.total / length;
        let side_sq = side * side;
        (side_sq / self.min).max(self.max / side_sq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_two_squares_tile_along_width() {
        let rects = SquarifiedTreemap::squarify(&[100.0, 100.0], Rect::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(rects.len(), 2);
        assert_eq!(rects[0], Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(rects[1], Rect::new(10.0, 0.0, 10.0, 10.0));
    }

    #[test]
    fn test_tall_container_stacks_vertically() {
        let rects = SquarifiedTreemap::squarify(&[100.0, 100.0], Rect::new(5.0, 5.0, 10.0, 20.0));
        assert_eq!(rects[0], Rect::new(5.0, 5.0, 10.0, 10.0));
        assert_eq!(rects[1], Rect::new(5.0, 15.0, 10.0, 10.0));
    }

    #[test]
    fn test_treemap_basic() {
        let container = Rect::new(0.0, 0.0, 800.0, 600.0);
        let total = container.area();
        let areas = [total * 0.5, total * 1.0 / 3.0, total / 6.0];
        let layout = SquarifiedTreemap::squarify(&areas, container);

        assert_eq!(layout.len(), 3);
        let total_area: f32 = layout.iter().map(|r| r.area()).sum();
        let ratio = total_area / container.area();
        assert!(ratio > 0.99 && ratio < 1.01,
                "Total area ratio {} should be close to 1.0", ratio);
        for (rect, area) in layout.iter().zip(areas) {
            assert!((rect.area() - area).abs() / area < 1e-3);
        }
    }

    #[test]
    fn test_zero_area_is_placed_alone() {
        let rects = SquarifiedTreemap::squarify(&[0.0, 200.0], Rect::new(0.0, 0.0, 20.0, 10.0));
        assert_eq!(rects.len(), 2);
        assert!(approx(rects[0].area(), 0.0));
        assert!(approx(rects[1].area(), 200.0));
    }

    #[test]
    fn test_degenerate_container_yields_empty_rects() {
        let rects = SquarifiedTreemap::squarify(&[1.0, 2.0, 3.0], Rect::new(0.0, 0.0, 0.0, 10.0));
        assert_eq!(rects.len(), 3);
        assert!(rects.iter().all(|r| r.is_empty()));
    }

    #[test]
    fn test_empty_input() {
        assert!(SquarifiedTreemap::squarify(&[], Rect::new(0.0, 0.0, 10.0, 10.0)).is_empty());
    }

    #[test]
    fn test_rect_contains_is_half_open() {
        let r = Rect::new(0.0, 0.0, 10.0, 5.0);
        assert!(r.contains(0.0, 0.0));
        assert!(r.contains(9.9, 4.9));
        assert!(!r.contains(10.0, 2.0));
        assert!(!r.contains(3.0, 5.0));
    }

    proptest! {
        #[test]
        fn prop_rects_partition_container(
            weights in prop::collection::vec(1.0f32..1000.0, 1..60),
            w in 1.0f32..1000.0,
            h in 1.0f32..1000.0,
        ) {
            let container = Rect::new(3.0, 7.0, w, h);
            let sum: f32 = weights.iter().sum();
            let areas: Vec<f32> = weights.iter().map(|x| x / sum * container.area()).collect();

            let rects = SquarifiedTreemap::squarify(&areas, container);
            prop_assert_eq!(rects.len(), areas.len());

            let tol = container.area() * 1e-3;
            let covered: f32 = rects.iter().map(|r| r.area()).sum();
            prop_assert!((covered - container.area()).abs() <= tol);

            for (rect, area) in rects.iter().zip(&areas) {
                prop_assert!((rect.area() - area).abs() <= tol);
                prop_assert!(rect.x >= container.x - 1e-2 && rect.y >= container.y - 1e-2);
                prop_assert!(rect.right() <= container.right() + 1e-2);
                prop_assert!(rect.bottom() <= container.bottom() + 1e-2);
            }
        }
    }
}
