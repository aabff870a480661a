//! Bingo line detection.
//!
//! # Invariants
//! - Pure over its inputs; recomputed on every read, never cached.
//! - The free-space cell always counts as completed.
//! - Each line is counted at most once, so a fully completed grid yields
//!   exactly `2 * grid_size + 2`.

use crate::model::grid::{generate_patterns, GridConfig, GridPattern, LineKind, Position};
use std::collections::BTreeSet;

/// Counts fully satisfied lines for the given completed positions.
pub fn count_bingos(config: &GridConfig, completed: &BTreeSet<Position>) -> usize {
    config
        .patterns()
        .iter()
        .filter(|pattern| is_pattern_complete(config, pattern, completed))
        .count()
}

/// Lines that are fully satisfied, in pattern order.
pub fn completed_lines(config: &GridConfig, completed: &BTreeSet<Position>) -> Vec<LineKind> {
    generate_patterns(config.grid_size())
        .into_iter()
        .filter(|pattern| is_pattern_complete(config, pattern, completed))
        .map(|pattern| pattern.kind)
        .collect()
}

fn is_pattern_complete(
    config: &GridConfig,
    pattern: &GridPattern,
    completed: &BTreeSet<Position>,
) -> bool {
    pattern
        .positions
        .iter()
        .all(|position| config.is_free_space(*position) || completed.contains(position))
}

#[cfg(test)]
mod tests {
    use super::{completed_lines, count_bingos};
    use crate::model::grid::{GridConfig, LineKind};
    use std::collections::BTreeSet;

    fn set(positions: &[usize]) -> BTreeSet<usize> {
        positions.iter().copied().collect()
    }

    #[test]
    fn empty_grid_has_no_bingo() {
        let config = GridConfig::with_center_free_space(5).unwrap();
        assert_eq!(count_bingos(&config, &BTreeSet::new()), 0);
    }

    #[test]
    fn free_space_completes_center_lines() {
        let config = GridConfig::with_center_free_space(5).unwrap();
        assert_eq!(count_bingos(&config, &set(&[0, 1, 2, 3, 4])), 1);
        assert_eq!(
            count_bingos(&config, &set(&[0, 1, 2, 3, 4, 10, 11, 13, 14])),
            2
        );
        assert_eq!(
            completed_lines(&config, &set(&[0, 6, 18, 24])),
            vec![LineKind::Diagonal]
        );
    }

    #[test]
    fn full_grid_counts_every_line_once() {
        for n in 2..=10 {
            let config = GridConfig::without_free_space(n).unwrap();
            let all: BTreeSet<usize> = (0..n * n).collect();
            assert_eq!(count_bingos(&config, &all), 2 * n + 2);

            let with_free = GridConfig::with_center_free_space(n).unwrap();
            let mut all_but_free = all.clone();
            all_but_free.remove(&with_free.free_space().unwrap());
            assert_eq!(count_bingos(&with_free, &all_but_free), 2 * n + 2);
        }
    }

    #[test]
    fn completing_more_positions_never_decreases_count() {
        let config = GridConfig::with_center_free_space(4).unwrap();
        let order = [3, 0, 15, 5, 9, 1, 2, 6, 12, 7, 11, 13, 14, 4, 8];
        let mut completed = BTreeSet::new();
        let mut previous = count_bingos(&config, &completed);
        for position in order {
            completed.insert(position);
            let current = count_bingos(&config, &completed);
            assert!(current >= previous);
            assert_eq!(current, count_bingos(&config, &completed));
            previous = current;
        }
        assert_eq!(previous, 10);
    }
}
