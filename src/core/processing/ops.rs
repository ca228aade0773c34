use ndarray::{Array2, Zip};

/// Denominators closer to zero than this yield an undefined pixel.
const EPS: f64 = 1e-10;

/// Element-wise division with undefined (NaN) output where the denominator is zero
fn safe_div(num: f64, den: f64) -> f64 {
    if den.is_nan() || den.abs() < EPS {
        f64::NAN
    } else {
        num / den
    }
}

/// Normalized difference: (a - b) / (a + b); NaN where either input is NaN or a + b == 0
pub fn normalized_difference(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    Zip::from(a)
        .and(b)
        .par_map_collect(|&a, &b| safe_div(a - b, a + b))
}

/// Enhanced vegetation index: 2.5 (nir - red) / (nir + 6 red - 7.5 blue + 1)
pub fn enhanced_vegetation(nir: &Array2<f64>, red: &Array2<f64>, blue: &Array2<f64>) -> Array2<f64> {
    Zip::from(nir)
        .and(red)
        .and(blue)
        .par_map_collect(|&n, &r, &b| 2.5 * safe_div(n - r, n + 6.0 * r - 7.5 * b + 1.0))
}

/// Soil adjusted vegetation index: ((nir - red) / (nir + red + l)) (1 + l)
pub fn soil_adjusted(nir: &Array2<f64>, red: &Array2<f64>, l: f64) -> Array2<f64> {
    Zip::from(nir)
        .and(red)
        .par_map_collect(|&n, &r| safe_div(n - r, n + r + l) * (1.0 + l))
}

/// Scale every defined pixel by `factor`, leaving NaN untouched
pub fn scale(a: &Array2<f64>, factor: f64) -> Array2<f64> {
    a.mapv(|v| v * factor)
}

/// Set pixels to NaN wherever `keep` is false
pub fn apply_mask(a: &Array2<f64>, keep: &Array2<bool>) -> Array2<f64> {
    Zip::from(a)
        .and(keep)
        .map_collect(|&v, &k| if k { v } else { f64::NAN })
}

/// Mean of defined pixels selected by `inside`; `None` when no pixel qualifies
pub fn masked_mean(a: &Array2<f64>, inside: &Array2<bool>) -> Option<f64> {
    let (sum, count) = a
        .iter()
        .zip(inside.iter())
        .filter(|&(v, &k)| k && !v.is_nan())
        .fold((0.0, 0usize), |(s, n), (v, _)| (s + v, n + 1));
    if count == 0 { None } else { Some(sum / count as f64) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn equal_bands_give_zero() {
        let a = array![[0.2, 0.35], [0.9, 0.01]];
        let nd = normalized_difference(&a, &a);
        assert!(nd.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn zero_sum_is_undefined_not_error() {
        let a = array![[0.0, 0.3]];
        let b = array![[0.0, -0.3]];
        let nd = normalized_difference(&a, &b);
        assert!(nd[[0, 0]].is_nan());
        assert!(nd[[0, 1]].is_nan());
    }

    #[test]
    fn nan_propagates() {
        let a = array![[f64::NAN, 0.5]];
        let b = array![[0.1, 0.1]];
        let nd = normalized_difference(&a, &b);
        assert!(nd[[0, 0]].is_nan());
        assert!((nd[[0, 1]] - 0.4 / 0.6).abs() < 1e-12);
    }

    #[test]
    fn evi_reference_value() {
        let evi = enhanced_vegetation(&array![[0.5]], &array![[0.1]], &array![[0.05]]);
        let expected = 2.5 * (0.4 / (0.5 + 0.6 - 0.375 + 1.0));
        assert!((evi[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn savi_reference_value() {
        let savi = soil_adjusted(&array![[0.5]], &array![[0.1]], 0.5);
        assert!((savi[[0, 0]] - (0.4 / 1.1) * 1.5).abs() < 1e-12);
    }

    #[test]
    fn mask_marks_undefined() {
        let a = array![[1.0, 2.0]];
        let keep = array![[true, false]];
        let out = apply_mask(&a, &keep);
        assert_eq!(out[[0, 0]], 1.0);
        assert!(out[[0, 1]].is_nan());
    }

    #[test]
    fn mean_skips_undefined_and_outside() {
        let a = array![[1.0, f64::NAN], [3.0, 100.0]];
        let inside = array![[true, true], [true, false]];
        assert_eq!(masked_mean(&a, &inside), Some(2.0));
        let nothing = array![[false, false], [false, false]];
        assert_eq!(masked_mean(&a, &nothing), None);
    }
}
