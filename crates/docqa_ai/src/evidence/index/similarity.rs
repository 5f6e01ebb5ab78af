pub fn l2_norm(v: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for x in v {
        sum += x * x;
    }
    sum.sqrt()
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    let mut sum = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        sum += x * y;
    }
    sum
}

/// Scale `v` to unit length in place. Caller guarantees a non-zero norm.
pub fn normalize(v: &mut [f32], norm: f32) {
    for x in v.iter_mut() {
        *x /= norm;
    }
}
