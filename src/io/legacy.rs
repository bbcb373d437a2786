//! Import of plain-text RBM dumps.
//!
//! Layout: visible count, hidden count, then one `(re,im)` number per line for
//! `a`, `b` and `W` (row-major, `nv × nh`).

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::error::{Result, VmcError};
use crate::lattice::Group;
use crate::wavefunction::Rbm;

fn parse_error(line: usize, message: impl Into<String>) -> VmcError {
    VmcError::Parse {
        line,
        message: message.into(),
    }
}

fn parse_count(line: usize, text: Option<&str>) -> Result<usize> {
    let text = text.ok_or_else(|| parse_error(line, "unexpected end of file"))?;
    text.trim()
        .parse()
        .map_err(|e| parse_error(line, format!("expected an integer, got '{}' ({})", text.trim(), e)))
}

/// Parse `(re,im)`.
fn parse_complex(line: usize, text: &str) -> Result<Complex64> {
    let inner = text
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| parse_error(line, format!("expected (re,im), got '{}'", text.trim())))?;
    let (re, im) = inner
        .split_once(',')
        .ok_or_else(|| parse_error(line, format!("missing ',' in '{}'", text.trim())))?;
    let part = |s: &str| {
        s.trim()
            .parse::<f64>()
            .map_err(|e| parse_error(line, format!("bad number '{}' ({})", s.trim(), e)))
    };
    Ok(Complex64::new(part(re)?, part(im)?))
}

/// Build an RBM from dump text.
///
/// For a group of order `ng > 1` the dump is taken to hold the fully unfolded
/// network: `a` is divided by `ng` and only every `ng`-th hidden unit is kept,
/// giving `nh / ng` hidden units per unit cell.
pub fn parse_carleo_wf(text: &str, group: Group) -> Result<Rbm> {
    let mut lines = text.lines().enumerate().map(|(i, l)| (i + 1, l));
    let nv = parse_count(1, lines.next().map(|(_, l)| l))?;
    let nh = parse_count(2, lines.next().map(|(_, l)| l))?;

    let data = lines
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| parse_complex(i, l))
        .collect::<Result<Vec<_>>>()?;
    let expected = nv + nh + nv * nh;
    if data.len() != expected {
        return Err(parse_error(
            data.len() + 2,
            format!("expected {} values for nv={} nh={}, found {}", expected, nv, nh, data.len()),
        ));
    }

    let ng = group.ng();
    if nh % ng != 0 {
        return Err(VmcError::DimensionMismatch(format!(
            "{} hidden units cannot be folded by a group of order {}",
            nh, ng
        )));
    }
    let nb = nh / ng;
    let scale = Complex64::new(1.0 / ng as f64, 0.0);
    let a = DVector::from_fn(nv, |i, _| data[i] * scale);
    let b = DVector::from_fn(nb, |j, _| data[nv + j * ng]);
    let offset = nv + nh;
    let w = DMatrix::from_fn(nv, nb, |i, j| data[offset + i * nh + j * ng]);
    Rbm::new(a, b, w, group)
}

/// Read an RBM dump from `path`.
pub fn load_carleo_wf<P: AsRef<Path>>(path: P, group: Group) -> Result<Rbm> {
    let text = std::fs::read_to_string(path)?;
    parse_carleo_wf(&text, group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DUMP: &str = "2\n2\n(0.1,0.0)\n(0.2,-0.1)\n(0.3,0.0)\n(0.4,0.5)\n\
                        (1.0,0.0)\n(2.0,0.0)\n(3.0,0.0)\n(4.0,1.0)\n";

    #[test]
    fn test_parse_ungrouped() {
        let rbm = parse_carleo_wf(DUMP, Group::Trivial).unwrap();
        assert_eq!((rbm.nin(), rbm.nb()), (2, 2));
        assert_relative_eq!(rbm.a[1].im, -0.1);
        assert_relative_eq!(rbm.b[1].im, 0.5);
        assert_relative_eq!(rbm.w[(0, 1)].re, 2.0);
        assert_relative_eq!(rbm.w[(1, 1)].im, 1.0);
    }

    #[test]
    fn test_parse_grouped() {
        let rbm = parse_carleo_wf(DUMP, Group::translation(vec![2])).unwrap();
        assert_eq!((rbm.nin(), rbm.nb(), rbm.nhid()), (2, 1, 2));
        assert_relative_eq!(rbm.a[0].re, 0.05);
        assert_relative_eq!(rbm.b[0].re, 0.3);
        assert_relative_eq!(rbm.w[(0, 0)].re, 1.0);
        assert_relative_eq!(rbm.w[(1, 0)].re, 3.0);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            parse_carleo_wf("two\n2\n", Group::Trivial),
            Err(VmcError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_carleo_wf("1\n1\n(0.1,0.0)\n0.2\n(0.3,0.0)\n", Group::Trivial),
            Err(VmcError::Parse { line: 4, .. })
        ));
        assert!(matches!(
            parse_carleo_wf("1\n1\n(0.1,0.0)\n", Group::Trivial),
            Err(VmcError::Parse { .. })
        ));
        let odd = format!("2\n3\n{}", "(0,0)\n".repeat(11));
        assert!(parse_carleo_wf(&odd, Group::Trivial).is_ok());
        assert!(matches!(
            parse_carleo_wf(&odd, Group::translation(vec![2])),
            Err(VmcError::DimensionMismatch(_))
        ));
    }
}
