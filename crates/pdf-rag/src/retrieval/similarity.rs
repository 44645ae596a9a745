//! Vector similarity functions

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

/// Cosine similarity; 0.0 when either vector has zero length
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let (a_norm, b_norm) = (l2_norm(a), l2_norm(b));
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot(a, b) / (a_norm * b_norm)
}
