use nalgebra::Matrix3;

/// Greatest common divisor (Euclidean algorithm).
fn gcd(a: i64, b: i64) -> i64 {
    let mut a = a.abs();
    let mut b = b.abs();
    while b != 0 {
        let temp = b;
        b = a % b;
        a = temp;
    }
    a
}

/// A reduced rational number with positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rational {
    pub numer: i64,
    pub denom: i64,
}

impl Rational {
    pub fn new(numer: i64, denom: i64) -> Self {
        let g = gcd(numer, denom).max(1);
        let sign = if denom < 0 { -1 } else { 1 };
        Self {
            numer: sign * numer / g,
            denom: sign * denom / g,
        }
    }

    pub fn to_f64(self) -> f64 {
        self.numer as f64 / self.denom as f64
    }
}

/// Closest rational to `value` whose denominator does not exceed `max_denominator`.
///
/// Walks the continued fraction expansion until the next convergent would overflow the
/// bound, then picks between the last convergent and the best semiconvergent.
pub fn limit_denominator(value: f64, max_denominator: i64) -> Rational {
    let max_denominator = max_denominator.max(1);
    let (mut p0, mut q0, mut p1, mut q1) = (0_i64, 1_i64, 1_i64, 0_i64);
    let mut x = value;
    let mut exact = false;

    loop {
        let a = x.floor();
        let a_int = a as i64;
        let q2 = q0 + a_int * q1;
        if q2 > max_denominator {
            break;
        }
        let p2 = p0 + a_int * p1;
        p0 = p1;
        q0 = q1;
        p1 = p2;
        q1 = q2;

        let remainder = x - a;
        if remainder.abs() < 1e-12 {
            exact = true;
            break;
        }
        x = 1.0 / remainder;
        if !x.is_finite() {
            exact = true;
            break;
        }
    }

    let convergent = Rational::new(p1, q1);
    if exact {
        return convergent;
    }
    let k = (max_denominator - q0) / q1;
    let semiconvergent = Rational::new(p0 + k * p1, q0 + k * q1);
    if (convergent.to_f64() - value).abs() <= (semiconvergent.to_f64() - value).abs() {
        convergent
    } else {
        semiconvergent
    }
}

/// Elementwise [`limit_denominator`] applied to a matrix.
pub fn rationalize_matrix(matrix: &Matrix3<f64>, max_denominator: i64) -> Matrix3<f64> {
    matrix.map(|v| limit_denominator(v, max_denominator).to_f64())
}
