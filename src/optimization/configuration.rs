use std::collections::VecDeque;

use tracing::trace;

use super::{ComparePair, TranslationModel};
use crate::error::StitchError;

/// A weighted correspondence between a point of `tile` and a point of `other`.
/// Points are local coordinates; world coordinates follow from the models.
#[derive(Debug, Clone, PartialEq)]
pub struct PointMatch {
    pub tile: usize,
    pub other: usize,
    pub local: Vec<f64>,
    pub other_local: Vec<f64>,
    pub weight: f64,
    /// Index of the pair that produced this match.
    pub pair: usize,
}

impl PointMatch {
    /// World-space distance between the two ends.
    pub fn distance(&self, models: &[TranslationModel]) -> f64 {
        let p = models[self.tile].apply(&self.local);
        let q = models[self.other].apply(&self.other_local);
        p.iter().zip(&q).map(|(a, b)| (a - b) * (a - b)).sum::<f64>().sqrt()
    }
}

/// Running record of the optimization error, used to detect a plateau.
#[derive(Debug, Clone, Default)]
pub struct ErrorStatistic {
    values: Vec<f64>,
}

impl ErrorStatistic {
    pub fn add(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Average change per iteration over the last `width` iterations.
    pub fn wide_slope(&self, width: usize) -> f64 {
        let n = self.values.len();
        if width == 0 || n <= width {
            return f64::INFINITY;
        }
        (self.values[n - 1] - self.values[n - 1 - width]) / width as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigurationErrors {
    pub average: f64,
    pub max: f64,
}

/// The tile graph of one optimization attempt: every tile with at least one
/// accepted pair, the symmetric point matches, and the fixed tile.
#[derive(Debug, Clone, Default)]
pub struct TileConfiguration {
    /// Tile indices in the order they were first connected.
    tiles: Vec<usize>,
    fixed: Option<usize>,
    matches: Vec<PointMatch>,
    /// Per tile index: indices into `matches` owned by that tile.
    tile_matches: Vec<Vec<usize>>,
    /// Per tile index: connected tile indices without repeats.
    connections: Vec<Vec<usize>>,
}

impl TileConfiguration {
    /// Builds the graph from every pair with a valid overlap and a correlation
    /// of at least `reg_threshold`. Pairs below the threshold are invalidated.
    pub fn build(pairs: &mut [ComparePair], reg_threshold: f32, num_tiles: usize) -> crate::Result<Self> {
        let mut config = Self {
            tile_matches: vec![Vec::new(); num_tiles],
            connections: vec![Vec::new(); num_tiles],
            ..Self::default()
        };

        for (index, pair) in pairs.iter_mut().enumerate() {
            if !pair.is_edge(reg_threshold) {
                pair.invalidate();
                continue;
            }
            if pair.first >= num_tiles || pair.second >= num_tiles || pair.first == pair.second {
                return Err(StitchError::Configuration(format!(
                    "pair {} connects tiles {} and {} of {}",
                    index, pair.first, pair.second, num_tiles
                ))
                .into());
            }

            let origin = vec![0.0; pair.relative_shift.len()];
            let shifted: Vec<f64> = pair.relative_shift.iter().map(|&s| -(s as f64)).collect();
            let weight = pair.cross_correlation as f64;

            config.add_match(PointMatch {
                tile: pair.first,
                other: pair.second,
                local: origin.clone(),
                other_local: shifted.clone(),
                weight,
                pair: index,
            });
            config.add_match(PointMatch {
                tile: pair.second,
                other: pair.first,
                local: shifted,
                other_local: origin,
                weight,
                pair: index,
            });
            config.connect(pair.first, pair.second);
        }

        Ok(config)
    }

    fn add_match(&mut self, m: PointMatch) {
        self.tile_matches[m.tile].push(self.matches.len());
        self.matches.push(m);
    }

    fn connect(&mut self, a: usize, b: usize) {
        for (from, to) in [(a, b), (b, a)] {
            if !self.tiles.contains(&from) {
                self.tiles.push(from);
            }
            if !self.connections[from].contains(&to) {
                self.connections[from].push(to);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn tiles(&self) -> &[usize] {
        &self.tiles
    }

    pub fn matches(&self) -> &[PointMatch] {
        &self.matches
    }

    pub fn connected_tiles(&self, tile: usize) -> &[usize] {
        self.connections.get(tile).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_connections(&self, tile: usize) -> bool {
        !self.connected_tiles(tile).is_empty()
    }

    pub fn fixed_tile(&self) -> Option<usize> {
        self.fixed
    }

    pub fn fix_tile(&mut self, tile: usize) {
        self.fixed = Some(tile);
    }

    /// Groups of mutually reachable tiles, each in breadth-first order. Groups
    /// are listed in the order their first tile was connected.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.connections.len()];
        let mut groups = Vec::new();
        for &start in &self.tiles {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut group = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(tile) = queue.pop_front() {
                for &next in self.connected_tiles(tile) {
                    if !seen[next] {
                        seen[next] = true;
                        group.push(next);
                        queue.push_back(next);
                    }
                }
            }
            groups.push(group);
        }
        groups
    }

    /// The largest group; the earliest one wins ties.
    pub fn largest_component(&self) -> Vec<usize> {
        self.components()
            .into_iter()
            .fold(Vec::new(), |best, group| if group.len() > best.len() { group } else { best })
    }

    /// Drops every tile and match outside the group containing `tile` and
    /// returns the dropped tiles.
    pub fn retain_component(&mut self, tile: usize) -> Vec<usize> {
        let mut keep = vec![false; self.connections.len()];
        if let Some(group) = self.components().into_iter().find(|g| g.contains(&tile)) {
            for t in group {
                keep[t] = true;
            }
        }

        let dropped: Vec<usize> = self.tiles.iter().copied().filter(|&t| !keep[t]).collect();
        if dropped.is_empty() {
            return dropped;
        }

        self.tiles.retain(|&t| keep[t]);
        self.matches.retain(|m| keep[m.tile]);
        for list in self.tile_matches.iter_mut() {
            list.clear();
        }
        for (index, m) in self.matches.iter().enumerate() {
            self.tile_matches[m.tile].push(index);
        }
        for &t in &dropped {
            self.connections[t].clear();
        }
        if self.fixed.is_some_and(|f| !keep[f]) {
            self.fixed = None;
        }
        dropped
    }

    /// Fits `tile` to the matches whose other end passes `use_other`.
    fn fit_tile<F>(&self, tile: usize, models: &mut [TranslationModel], use_other: F) -> Result<(), StitchError>
    where
        F: Fn(usize) -> bool,
    {
        let correspondences: Vec<(&[f64], Vec<f64>, f64)> = self.tile_matches[tile]
            .iter()
            .map(|&i| &self.matches[i])
            .filter(|m| use_other(m.other))
            .map(|m| (m.local.as_slice(), models[m.other].apply(&m.other_local), m.weight))
            .collect();
        models[tile].fit(correspondences)
    }

    /// Breadth-first from the fixed tile: each newly reached tile is fitted to
    /// the matches with tiles already placed. Returns the tiles that could not
    /// be reached.
    pub fn pre_align(&self, models: &mut [TranslationModel]) -> Result<Vec<usize>, StitchError> {
        let mut aligned = vec![false; models.len()];
        let mut queue = VecDeque::new();
        if let Some(fixed) = self.fixed {
            aligned[fixed] = true;
            queue.push_back(fixed);
        }

        while let Some(tile) = queue.pop_front() {
            for &next in self.connected_tiles(tile) {
                if aligned[next] {
                    continue;
                }
                self.fit_tile(next, models, |other| aligned[other])?;
                aligned[next] = true;
                queue.push_back(next);
            }
        }

        Ok(self.tiles.iter().copied().filter(|&t| !aligned[t]).collect())
    }

    /// Iteratively refits every non-fixed tile to all of its matches until the
    /// mean error stops changing or `max_iterations` is reached. Returns the
    /// number of iterations run.
    pub fn optimize(
        &self,
        models: &mut [TranslationModel],
        max_allowed_error: f64,
        max_iterations: usize,
        max_plateau_width: usize,
    ) -> Result<usize, StitchError> {
        let mut observer = ErrorStatistic::default();
        let mut iteration = 0;
        let mut proceed = iteration < max_iterations;

        while proceed {
            for &tile in &self.tiles {
                if Some(tile) == self.fixed {
                    continue;
                }
                self.fit_tile(tile, models, |_| true)?;
            }

            let errors = self.errors(models);
            if !errors.average.is_finite() {
                return Err(StitchError::Numerical(format!(
                    "mean error became {} after {} iterations",
                    errors.average, iteration
                )));
            }
            observer.add(errors.average);

            if iteration > max_plateau_width {
                proceed = errors.average > max_allowed_error;

                let mut width = max_plateau_width;
                while !proceed && width >= 1 {
                    proceed |= observer.wide_slope(width).abs() > 0.0001;
                    width /= 2;
                }
            }

            iteration += 1;
            proceed &= iteration < max_iterations;
        }

        trace!(iterations = iteration, "tile configuration optimized");
        Ok(iteration)
    }

    /// Mean and maximum world-space residual over all point matches.
    pub fn errors(&self, models: &[TranslationModel]) -> ConfigurationErrors {
        if self.matches.is_empty() {
            return ConfigurationErrors { average: 0.0, max: 0.0 };
        }
        let mut sum = 0.0;
        let mut max = 0.0f64;
        for m in &self.matches {
            let d = m.distance(models);
            sum += d;
            max = max.max(d);
        }
        ConfigurationErrors {
            average: sum / self.matches.len() as f64,
            max,
        }
    }

    /// The match with the largest residual; the first one wins ties.
    pub fn worst_match(&self, models: &[TranslationModel]) -> Option<&PointMatch> {
        let mut worst: Option<(&PointMatch, f64)> = None;
        for m in &self.matches {
            let d = m.distance(models);
            if worst.map_or(true, |(_, w)| d > w) {
                worst = Some((m, d));
            }
        }
        worst.map(|(m, _)| m)
    }
}
