use std::f64::consts::{LN_2, PI};

const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// `log(erfc(x))`, stable over the whole real line.
///
/// Uses the Numerical-Recipes Chebyshev approximation for `erfc(|x|)` in
/// Horner form, kept in log-space throughout so that large `x` (where
/// `erfc` underflows long before its logarithm would) never round-trips
/// through `exp`/`ln`. For `x < 0`, reduces via `erfc(-x) = 2 - erfc(x)`.
pub fn logerfc(x: f64) -> f64 {
    let ax = x.abs();
    let t = 1.0 / (1.0 + 0.5 * ax);
    let poly = -1.26551223
        + t * (1.00002368
            + t * (0.37409196
                + t * (0.09678418
                    + t * (-0.18628806
                        + t * (0.27886807
                            + t * (-1.13520398 + t * (1.48851587 + t * (-0.82215223 + t * 0.17087277))))))));
    let log_tau = t.ln() - ax * ax + poly;
    if x >= 0.0 {
        log_tau
    } else {
        (2.0 - log_tau.exp()).ln()
    }
}

fn erf(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 - logerfc(x).exp()
    } else {
        logerfc(-x).exp() - 1.0
    }
}

fn log_upper_tail(x: f64) -> f64 {
    logerfc(x / SQRT_2) - LN_2
}

/// `ln(1 - exp(x))` for `x <= 0`, avoiding cancellation near either end.
fn log1mexp(x: f64) -> f64 {
    if x > -LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

fn phi(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else {
        (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
    }
}

fn x_phi(x: f64) -> f64 {
    if x.is_infinite() {
        0.0
    } else {
        x * phi(x)
    }
}

fn log_mass(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY && b == f64::INFINITY {
        return 0.0;
    }
    if a == f64::NEG_INFINITY {
        return log_upper_tail(-b);
    }
    if b == f64::INFINITY {
        return log_upper_tail(a);
    }
    if a <= 0.0 && b >= 0.0 {
        let p = 0.5 * (erf(b / SQRT_2) - erf(a / SQRT_2));
        p.ln()
    } else if a >= 0.0 {
        let la = log_upper_tail(a);
        let lb = log_upper_tail(b);
        la + log1mexp(lb - la)
    } else {
        let la = log_upper_tail(-b);
        let lb = log_upper_tail(-a);
        la + log1mexp(lb - la)
    }
}

/// For `X ~ N(0,1)` conditioned on `a < X < b`, returns `(log p, mu', sigma'^2)`
/// where `p = P(a < X < b)`.
///
/// `log p` is computed through [`logerfc`] so that moments remain accurate
/// even when `a` and `b` are both far in one tail (where a naive
/// `erfc(a) - erfc(b)` loses all significant digits).
pub fn truncate_gaussian(a: f64, b: f64) -> (f64, f64, f64) {
    debug_assert!(a < b, "truncate_gaussian requires a < b, got a={a} b={b}");
    let log_p = log_mass(a, b);
    let p = log_p.exp();
    let mu = (phi(a) - phi(b)) / p;
    let var = 1.0 + (x_phi(a) - x_phi(b)) / p - mu * mu;
    (log_p, mu, var)
}
