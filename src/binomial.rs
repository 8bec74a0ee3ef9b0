pub fn binomial_coefficient(n: usize, mut k: usize) -> u64 {
    if k > n {
        return 0;
    }
    k = k.min(n - k);
    if k == 0 {
        return 1;
    }
    let mut res = 1u64;
    let n = n as u64;
    let k = k as u64;
    for i in 0..k {
        res = res * (n - i) / (i + 1);
    }
    res
}

/// Weight of the product term `B^d_i * B^e_j` when expressed in the Bernstein basis of
/// degree `d + e`, ie. `C(d,i) C(e,j) / C(d+e,i+j)`.
pub fn bernstein_product_weight(d: usize, i: usize, e: usize, j: usize) -> f64 {
    binomial_coefficient(d, i) as f64 * binomial_coefficient(e, j) as f64
        / binomial_coefficient(d + e, i + j) as f64
}

/// Evaluate all Bernstein basis functions of `degree` at `t`.
pub fn bernstein_basis(degree: usize, t: f64, out: &mut [f64]) {
    debug_assert!(out.len() == degree + 1);
    let s = 1.0 - t;
    out.fill(0.0);
    out[0] = 1.0;
    // In-place triangle: B^{k}_i = s B^{k-1}_i + t B^{k-1}_{i-1}
    for k in 1..=degree {
        for i in (1..=k).rev() {
            out[i] = s * out[i] + t * out[i - 1];
        }
        out[0] *= s;
    }
}
