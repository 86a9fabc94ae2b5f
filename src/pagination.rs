use crate::grid::Grid;

/// Ordered page grids for one merge. Every page but the last uses the same
/// full-capacity grid; the last page is solved for its own remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePlan {
    pub pages: Vec<Grid>,
    pub capacity: usize,
}

impl PagePlan {
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn total_elements(&self) -> usize {
        self.pages.iter().map(|grid| grid.element_count).sum()
    }

    /// Index of the first element placed on each page.
    pub fn page_offsets(&self) -> Vec<usize> {
        let mut offset = 0usize;
        self.pages
            .iter()
            .map(|grid| {
                let start = offset;
                offset += grid.element_count;
                start
            })
            .collect()
    }
}

/// Splits `total_count` elements into pages.
///
/// `max_pages` is a soft bound: a page never targets fewer than
/// `min_per_page` elements, so small inputs use fewer pages than allowed and
/// large `min_per_page` values may exceed it.
pub fn plan_pages(
    total_count: usize,
    element_width: f64,
    element_height: f64,
    min_per_page: usize,
    max_pages: usize,
) -> PagePlan {
    if total_count == 0 {
        return PagePlan {
            pages: Vec::new(),
            capacity: 0,
        };
    }

    let mut target = total_count as f64 / max_pages.max(1) as f64;
    if target < min_per_page as f64 {
        target = min_per_page as f64;
    }

    let full = Grid::solve_target(target, element_width, element_height);
    let capacity = full.capacity().max(1);
    let page_count = total_count.div_ceil(capacity);

    let pages = (0..page_count)
        .map(|index| {
            if index + 1 == page_count {
                Grid::solve(total_count - index * capacity, element_width, element_height)
            } else {
                full
            }
        })
        .collect();

    PagePlan { pages, capacity }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hundred_elements_over_four_pages() {
        let plan = plan_pages(100, 100.0, 100.0, 1, 4);
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.capacity, 25);
        assert_eq!(plan.total_elements(), 100);
        assert_eq!(plan.pages[0], plan.pages[1]);
        assert_eq!(plan.pages[1], plan.pages[2]);
        assert_eq!(plan.pages[3], Grid::solve(25, 100.0, 100.0));
    }

    #[test]
    fn min_per_page_caps_page_count_below_max_pages() {
        let plan = plan_pages(10, 100.0, 100.0, 10, 1);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.pages[0], Grid::solve(10, 100.0, 100.0));
    }

    #[test]
    fn fewer_elements_than_minimum_gives_one_page() {
        let plan = plan_pages(3, 100.0, 100.0, 20, 5);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.pages[0].element_count, 3);
    }

    #[test]
    fn exact_multiple_keeps_last_page_shape() {
        // target 9 -> 3x3 capacity 9, 18 elements -> two 3x3 pages
        let plan = plan_pages(18, 100.0, 100.0, 9, 2);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.pages[0], plan.pages[1]);
    }

    #[test]
    fn last_page_is_replanned_for_its_remainder() {
        let plan = plan_pages(23, 100.0, 100.0, 1, 3);
        let last = *plan.pages.last().unwrap();
        let again = plan_pages(last.element_count, 100.0, 100.0, 1, 1);
        assert_eq!(again.pages, vec![last]);
    }

    #[test]
    fn page_count_never_exceeds_max_pages_when_target_dominates() {
        for total in 1..=300usize {
            for max_pages in 1..=7usize {
                for &(w, h) in &[(100.0, 100.0), (160.0, 90.0), (90.0, 160.0)] {
                    let plan = plan_pages(total, w, h, 1, max_pages);
                    assert_eq!(plan.total_elements(), total);
                    assert!(
                        plan.len() <= max_pages,
                        "total={total} max_pages={max_pages} {w}x{h} -> {}",
                        plan.len()
                    );
                }
            }
        }
    }

    #[test]
    fn minimum_per_page_holds_except_last() {
        let plan = plan_pages(95, 120.0, 80.0, 12, 20);
        assert_eq!(plan.total_elements(), 95);
        for grid in &plan.pages[..plan.len() - 1] {
            assert!(grid.element_count >= 12);
        }
    }

    #[test]
    fn offsets_follow_page_counts() {
        let plan = plan_pages(100, 100.0, 100.0, 1, 4);
        assert_eq!(plan.page_offsets(), vec![0, 25, 50, 75]);
    }

    #[test]
    fn empty_input_has_no_pages() {
        assert!(plan_pages(0, 100.0, 100.0, 1, 1).is_empty());
    }
}
