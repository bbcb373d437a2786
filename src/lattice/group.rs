//! Symmetry groups acting on spin configurations.
//!
//! A group element `ig` maps a configuration to its image. Element indices are
//! packed row-major over the translation lengths `ngs`; a negative index `-ig`
//! denotes the inverse of `ig`.

use nalgebra::DVector;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VmcError};

/// Translation group of an N-dimensional periodic lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<usize>", into = "Vec<usize>")]
pub struct TranslationGroup {
    ngs: Vec<usize>,
    strides: Vec<usize>,
}

impl TranslationGroup {
    pub fn new(ngs: Vec<usize>) -> Self {
        let mut strides = vec![1; ngs.len()];
        for axis in (0..ngs.len().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * ngs[axis + 1];
        }
        Self { ngs, strides }
    }

    pub fn ngs(&self) -> &[usize] {
        &self.ngs
    }

    pub fn order(&self) -> usize {
        self.ngs.iter().product()
    }

    /// Per-axis shifts of element `ig`; negative indices give the inverse shifts.
    fn expand(&self, ig: isize) -> Vec<usize> {
        let mag = ig.unsigned_abs();
        self.ngs
            .iter()
            .zip(self.strides.iter())
            .map(|(&n, &s)| {
                let d = (mag / s) % n;
                if ig < 0 { (n - d) % n } else { d }
            })
            .collect()
    }

    fn pack(&self, digits: &[usize]) -> usize {
        digits.iter().zip(self.strides.iter()).map(|(d, s)| d * s).sum()
    }

    /// Source site of image position `ind` under element `ig`.
    fn ind_apply(&self, ind: usize, ig: isize) -> usize {
        let site = self.expand(ind as isize);
        let shift = self.expand(ig);
        let digits: Vec<usize> = site
            .iter()
            .zip(shift.iter())
            .zip(self.ngs.iter())
            .map(|((&s, &g), &n)| (s + n - g) % n)
            .collect();
        self.pack(&digits)
    }

    /// Image position of site `site` under element `ig`. Hot path of the theta
    /// update, so it avoids the digit vectors.
    fn dest(&self, site: usize, ig: usize) -> usize {
        self.ngs
            .iter()
            .zip(self.strides.iter())
            .map(|(&n, &s)| ((site / s) % n + (ig / s) % n) % n * s)
            .sum()
    }
}

impl From<Vec<usize>> for TranslationGroup {
    fn from(ngs: Vec<usize>) -> Self {
        Self::new(ngs)
    }
}

impl From<TranslationGroup> for Vec<usize> {
    fn from(g: TranslationGroup) -> Self {
        g.ngs
    }
}

/// Symmetry descriptor of an ansatz.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    /// Identity only, `ng == 1`.
    #[default]
    Trivial,
    Translation(TranslationGroup),
}

impl Group {
    pub fn translation(ngs: Vec<usize>) -> Self {
        Group::Translation(TranslationGroup::new(ngs))
    }

    /// Number of group elements.
    pub fn ng(&self) -> usize {
        match self {
            Group::Trivial => 1,
            Group::Translation(t) => t.order(),
        }
    }

    /// Number of lattice sites the group acts on, `None` for the trivial group.
    pub fn n_sites(&self) -> Option<usize> {
        match self {
            Group::Trivial => None,
            Group::Translation(t) => Some(t.order()),
        }
    }

    fn check_index(&self, ig: isize) -> Result<()> {
        let order = self.ng();
        if ig.unsigned_abs() >= order {
            return Err(VmcError::InvalidGroupIndex { index: ig, order });
        }
        Ok(())
    }

    /// Apply element `ig` to a configuration.
    pub fn apply<T: Copy>(&self, config: &[T], ig: isize) -> Result<Vec<T>> {
        self.check_index(ig)?;
        Ok(match self {
            Group::Trivial => config.to_vec(),
            Group::Translation(t) => (0..config.len())
                .map(|i| config[t.ind_apply(i, ig)])
                .collect(),
        })
    }

    /// Apply element `ig` to an index: the returned index is the site that lands on
    /// position `ind`, so `config[ind_apply(i, ig)] == apply(config, ig)[i]`.
    pub fn ind_apply(&self, ind: usize, ig: isize) -> Result<usize> {
        self.check_index(ig)?;
        Ok(match self {
            Group::Trivial => ind,
            Group::Translation(t) => t.ind_apply(ind, ig),
        })
    }

    /// All `ng` images of a configuration, row `g` is `apply(config, g)`.
    pub fn apply_all<T: Copy>(&self, config: &[T]) -> Vec<Vec<T>> {
        (0..self.ng())
            .map(|g| match self {
                Group::Trivial => config.to_vec(),
                Group::Translation(t) => (0..config.len())
                    .map(|i| config[t.ind_apply(i, g as isize)])
                    .collect(),
            })
            .collect()
    }

    /// Position that site `site` occupies in image `g` (`0 <= g < ng`).
    #[inline]
    pub fn dest(&self, site: usize, g: usize) -> usize {
        match self {
            Group::Trivial => site,
            Group::Translation(t) => t.dest(site, g),
        }
    }

    /// Fold a visible bias over the group: `a_eff[k] = Σ_g a[dest(k, g)]`.
    pub fn fold_visible(&self, a: &DVector<Complex64>) -> DVector<Complex64> {
        match self {
            Group::Trivial => a.clone(),
            Group::Translation(_) => DVector::from_fn(a.len(), |k, _| {
                (0..self.ng()).map(|g| a[self.dest(k, g)]).sum()
            }),
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Group::Trivial => write!(f, "NoGroup"),
            Group::Translation(t) => write!(f, "Translation Group {:?}", t.ngs),
        }
    }
}
