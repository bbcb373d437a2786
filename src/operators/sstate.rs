//! Sparse representation of a state as a weighted sum of basis configurations.

use std::cmp::Ordering;

use nalgebra::DVector;
use num_complex::Complex64;

use crate::error::{Result, VmcError};
use crate::lattice::SpinSpace;

/// Weighted configurations, kept sorted lexicographically with duplicates merged.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseState {
    pub ws: Vec<Complex64>,
    pub configs: Vec<Vec<i8>>,
}

impl SparseState {
    pub fn new(ws: Vec<Complex64>, configs: Vec<Vec<i8>>) -> Result<Self> {
        if ws.len() != configs.len() {
            return Err(VmcError::DimensionMismatch(format!(
                "{} weights for {} configurations",
                ws.len(),
                configs.len()
            )));
        }
        if let Some(first) = configs.first() {
            if let Some(bad) = configs.iter().find(|c| c.len() != first.len()) {
                return Err(VmcError::ConfigLength {
                    expected: first.len(),
                    found: bad.len(),
                });
            }
        }
        Ok(Self::compact(ws, configs))
    }

    /// A single basis configuration with unit weight.
    pub fn basis(config: Vec<i8>) -> Self {
        Self {
            ws: vec![Complex64::new(1.0, 0.0)],
            configs: vec![config],
        }
    }

    /// Sort lexicographically and sum the weights of repeated configurations.
    pub(crate) fn compact(ws: Vec<Complex64>, configs: Vec<Vec<i8>>) -> Self {
        let mut pairs: Vec<(Vec<i8>, Complex64)> = configs.into_iter().zip(ws).collect();
        pairs.sort_by(|x, y| x.0.cmp(&y.0));

        let mut out_ws: Vec<Complex64> = Vec::with_capacity(pairs.len());
        let mut out_configs: Vec<Vec<i8>> = Vec::with_capacity(pairs.len());
        for (config, w) in pairs {
            match out_configs.last() {
                Some(last) if *last == config => {
                    if let Some(acc) = out_ws.last_mut() {
                        *acc += w;
                    }
                }
                _ => {
                    out_configs.push(config);
                    out_ws.push(w);
                }
            }
        }
        Self {
            ws: out_ws,
            configs: out_configs,
        }
    }

    pub fn len(&self) -> usize {
        self.ws.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ws.is_empty()
    }

    pub fn scale(&self, factor: Complex64) -> Self {
        Self {
            ws: self.ws.iter().map(|w| w * factor).collect(),
            configs: self.configs.clone(),
        }
    }

    /// Hermitian conjugate.
    pub fn tobra(&self) -> Self {
        Self {
            ws: self.ws.iter().map(|w| w.conj()).collect(),
            configs: self.configs.clone(),
        }
    }

    /// `<self|ket>`, conjugating the weights of `self`.
    pub fn overlap(&self, ket: &SparseState) -> Complex64 {
        soverlap(self, ket)
    }

    pub fn tovec(&self, space: &SpinSpace) -> DVector<Complex64> {
        let mut vec = DVector::zeros(space.hndim());
        for (w, config) in self.ws.iter().zip(self.configs.iter()) {
            vec[space.config2ind(config)] += w;
        }
        vec
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Complex64, &Vec<i8>)> {
        self.ws.iter().zip(self.configs.iter())
    }
}

impl std::fmt::Display for SparseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (w, c) in self.iter() {
            writeln!(f, "{:.2}: {:?}", w, c)?;
        }
        Ok(())
    }
}

/// Sparse state from a dense vector, dropping entries with `|v_i| <= tol`.
pub fn vec2sstate(vec: &DVector<Complex64>, space: &SpinSpace, tol: f64) -> SparseState {
    let (ws, configs) = vec
        .iter()
        .enumerate()
        .filter(|(_, v)| v.norm() > tol)
        .map(|(ind, v)| (*v, space.ind2config(ind)))
        .unzip();
    SparseState::compact(ws, configs)
}

/// Overlap `<bra|ket>` by a merge over the two sorted configuration lists.
pub fn soverlap(bra: &SparseState, ket: &SparseState) -> Complex64 {
    let (mut i, mut j) = (0, 0);
    let mut res = Complex64::new(0.0, 0.0);
    while i < bra.len() && j < ket.len() {
        match bra.configs[i].cmp(&ket.configs[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                res += bra.ws[i].conj() * ket.ws[j];
                i += 1;
                j += 1;
            }
        }
    }
    res
}
