//! D8 steepest-descent routing and upslope area.

use crate::grid::Grid;

/// D8 neighbour offsets (dr, dc): N, NE, E, SE, S, SW, W, NW.
pub(crate) const D8_OFFSETS: [(isize, isize); 8] = [
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
];

/// Single-direction flow graph over the valid cells of a grid.
#[derive(Debug, Clone)]
pub(crate) struct FlowField {
    /// Receiving cell of each cell; `None` for pits, outlets and missing cells.
    pub downstream: Vec<Option<usize>>,
    /// Horizontal distance to the receiving cell in map units.
    pub step: Vec<f64>,
    pub valid: Vec<bool>,
}

impl FlowField {
    /// Route every valid cell to its steepest strictly-lower neighbour.
    pub fn d8(elevation: &Grid) -> Self {
        let (w, h) = (elevation.width, elevation.height);
        let dx = elevation.transform.cell_width.abs();
        let dy = elevation.transform.cell_height.abs();
        let n = w * h;
        let mut downstream = vec![None; n];
        let mut step = vec![0.0; n];
        let valid: Vec<bool> = (0..n).map(|i| elevation.value_at(i).is_some()).collect();

        for r in 0..h {
            for c in 0..w {
                let i = r * w + c;
                let Some(z) = elevation.value(r, c) else { continue };
                let mut best: Option<(usize, f64, f64)> = None;
                for &(dr, dc) in &D8_OFFSETS {
                    let nr = r as isize + dr;
                    let nc = c as isize + dc;
                    if nr < 0 || nc < 0 || nr >= h as isize || nc >= w as isize {
                        continue;
                    }
                    let (nr, nc) = (nr as usize, nc as usize);
                    let Some(nz) = elevation.value(nr, nc) else { continue };
                    let dist = ((dr as f64 * dy).powi(2) + (dc as f64 * dx).powi(2)).sqrt();
                    let slope = (z - nz) as f64 / dist;
                    if slope > 0.0 && best.map_or(true, |(_, s, _)| slope > s) {
                        best = Some((nr * w + nc, slope, dist));
                    }
                }
                if let Some((j, _, dist)) = best {
                    downstream[i] = Some(j);
                    step[i] = dist;
                }
            }
        }
        Self { downstream, step, valid }
    }

    /// Number of valid cells draining through each cell, itself included.
    ///
    /// Processes cells in topological order so every donor is finished
    /// before its receiver.
    pub fn accumulation(&self) -> Vec<f64> {
        let n = self.downstream.len();
        let mut remaining = vec![0usize; n];
        for j in self.downstream.iter().flatten() {
            remaining[*j] += 1;
        }
        let mut flow: Vec<f64> = self.valid.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect();
        let mut ready: Vec<usize> = (0..n).filter(|&i| self.valid[i] && remaining[i] == 0).collect();

        while let Some(i) = ready.pop() {
            if let Some(j) = self.downstream[i] {
                flow[j] += flow[i];
                remaining[j] -= 1;
                if remaining[j] == 0 {
                    ready.push(j);
                }
            }
        }
        flow
    }

    /// Number of valid cells whose flow path reaches each cell within
    /// `max_length` map units, itself included.
    pub fn partial_accumulation(&self, max_length: f64) -> Vec<f64> {
        let n = self.downstream.len();
        let mut flow = vec![0.0; n];
        for start in (0..n).filter(|&i| self.valid[i]) {
            flow[start] += 1.0;
            let mut travelled = 0.0;
            let mut cell = start;
            while let Some(next) = self.downstream[cell] {
                travelled += self.step[cell];
                if travelled > max_length {
                    break;
                }
                flow[next] += 1.0;
                cell = next;
            }
        }
        flow
    }
}
