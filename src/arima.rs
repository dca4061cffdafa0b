//! Seasonal ARIMA with automatic order selection.
//!
//! The model treats the daily series as having an annual season of
//! [`SEASONAL_PERIOD`] observations and is built in three steps:
//!
//! - **Integration**: the differencing order `d` is raised while the series
//!   still behaves like a random walk (lag-1 autocorrelation above 0.9) and
//!   differencing actually lowers its standard deviation.
//! - **Estimation**: every candidate `(p, q, P, Q)` is estimated with the
//!   Hannan–Rissanen procedure. A long autoregression supplies innovation
//!   estimates, then the ARMA coefficients (including the seasonal lag) come
//!   from one least-squares regression.
//! - **Selection**: candidates are ranked by AIC over a common effective
//!   sample so the scores are comparable.
//!
//! Prediction intervals come from the psi-weights of the integrated model, so
//! their width grows with the horizon as the fitted dynamics dictate.

use ordered_float::OrderedFloat;
use serde::Serialize;

/// Observations per seasonal cycle (one year of daily data, 365.25 rounded).
pub const SEASONAL_PERIOD: usize = 365;

/// Smallest series accepted: just over two full seasonal cycles.
pub const MIN_OBSERVATIONS: usize = 2 * SEASONAL_PERIOD + 1;

const MAX_D: usize = 2;
const MAX_P: usize = 3;
const MAX_Q: usize = 2;
const LONG_AR_ORDER: usize = 30;
const UNIT_ROOT_ACF: f64 = 0.9;

/// Standard normal quantile for a two-sided 80% interval.
pub const Z_80: f64 = 1.281_551_565_544_600_4;
/// Standard normal quantile for a two-sided 95% interval.
pub const Z_95: f64 = 1.959_963_984_540_054;

/// Orders of a seasonal ARIMA(p,d,q)(P,0,Q)[s] model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
    pub seasonal_p: usize,
    pub seasonal_q: usize,
    pub period: usize,
}

impl ArimaOrder {
    fn ar_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.p).collect();
        if self.seasonal_p > 0 {
            lags.push(self.period);
        }
        lags
    }

    fn ma_lags(&self) -> Vec<usize> {
        let mut lags: Vec<usize> = (1..=self.q).collect();
        if self.seasonal_q > 0 {
            lags.push(self.period);
        }
        lags
    }

    /// Number of ARMA coefficients (excluding mean and variance).
    pub fn coefficient_count(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ARIMA({},{},{})({},0,{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_q, self.period
        )
    }
}

/// Reasons a model cannot be fit or queried.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelFitError {
    /// Series shorter than the two-season minimum
    InsufficientData { required: usize, actual: usize },
    /// Series has (numerically) zero variance
    Degenerate,
    /// Series contains NaN or infinite values
    InvalidValue(usize),
    /// No candidate order could be estimated
    Diverged(String),
    /// Forecast requested for zero steps ahead
    InvalidHorizon,
}

impl std::fmt::Display for ModelFitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFitError::InsufficientData { required, actual } => write!(
                f,
                "Insufficient data: need at least {} observations, got {}",
                required, actual
            ),
            ModelFitError::Degenerate => write!(f, "Series has zero variance"),
            ModelFitError::InvalidValue(index) => {
                write!(f, "Series contains a non-finite value at index {}", index)
            }
            ModelFitError::Diverged(msg) => write!(f, "Model estimation diverged: {}", msg),
            ModelFitError::InvalidHorizon => write!(f, "Forecast horizon must be at least one day"),
        }
    }
}

impl std::error::Error for ModelFitError {}

/// A fitted seasonal ARIMA model.
#[derive(Debug, Clone)]
pub struct SeasonalArima {
    order: ArimaOrder,
    /// Mean of the differenced series (drift when d = 1); zero when d = 2
    intercept: f64,
    /// (lag, coefficient) pairs applied to the centered differenced series
    ar_terms: Vec<(usize, f64)>,
    /// (lag, coefficient) pairs applied to past innovations
    ma_terms: Vec<(usize, f64)>,
    sigma2: f64,
    aic: f64,
    n_effective: usize,
    /// Centered differenced series
    centered: Vec<f64>,
    /// Innovations aligned with `centered`
    residuals: Vec<f64>,
    /// Last value of each differencing level, `tails[k]` = last of diff^k(y)
    tails: Vec<f64>,
}

struct Candidate {
    order: ArimaOrder,
    ar_terms: Vec<(usize, f64)>,
    ma_terms: Vec<(usize, f64)>,
    sigma2: f64,
    aic: f64,
    residuals: Vec<f64>,
}

impl SeasonalArima {
    /// Fits the best seasonal ARIMA (by AIC) to `series`.
    ///
    /// # Errors
    /// See [`ModelFitError`]; the white-noise candidate `(0,d,0)` is always
    /// admissible, so `Diverged` only appears for pathological input.
    pub fn auto_fit(series: &[f64]) -> Result<Self, ModelFitError> {
        validate_series(series)?;

        let d = select_differencing(series);
        let differenced = difference(series, d);
        let tails: Vec<f64> = (0..d)
            .map(|level| {
                let values = difference(series, level);
                values[values.len() - 1]
            })
            .collect();

        let intercept = if d < MAX_D { mean(&differenced) } else { 0.0 };
        let centered: Vec<f64> = differenced.iter().map(|v| v - intercept).collect();

        let m = centered.len();
        let long_order = LONG_AR_ORDER.min(m / 10).max(1);
        let start = long_order + SEASONAL_PERIOD;
        if m <= start + 2 * (MAX_P + MAX_Q + 2) {
            return Err(ModelFitError::InsufficientData {
                required: MIN_OBSERVATIONS,
                actual: series.len(),
            });
        }

        let innovations = long_ar_innovations(&centered, long_order)
            .ok_or_else(|| ModelFitError::Diverged("long autoregression failed".to_string()))?;

        let mean_params = usize::from(d < MAX_D);
        let best = candidate_orders(d)
            .filter_map(|order| estimate(order, &centered, &innovations, start, mean_params))
            .min_by_key(|candidate| OrderedFloat(candidate.aic))
            .ok_or_else(|| ModelFitError::Diverged("no admissible order".to_string()))?;

        Ok(SeasonalArima {
            order: best.order,
            intercept,
            ar_terms: best.ar_terms,
            ma_terms: best.ma_terms,
            sigma2: best.sigma2,
            aic: best.aic,
            n_effective: m - start,
            centered,
            residuals: best.residuals,
            tails,
        })
    }

    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.aic
    }

    /// Innovation variance estimate.
    pub fn sigma2(&self) -> f64 {
        self.sigma2
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn ar_terms(&self) -> &[(usize, f64)] {
        &self.ar_terms
    }

    pub fn ma_terms(&self) -> &[(usize, f64)] {
        &self.ma_terms
    }

    /// Observations the AIC was computed over.
    pub fn n_effective(&self) -> usize {
        self.n_effective
    }

    /// Point forecasts for the next `steps` observations on the original scale.
    pub fn point_forecast(&self, steps: usize) -> Vec<f64> {
        let m = self.centered.len();
        let mut values = self.centered.clone();
        let mut shocks = self.residuals.clone();
        values.reserve(steps);
        shocks.reserve(steps);

        for _ in 0..steps {
            let t = values.len();
            let ar: f64 = self
                .ar_terms
                .iter()
                .map(|&(lag, coef)| coef * values[t - lag])
                .sum();
            let ma: f64 = self
                .ma_terms
                .iter()
                .map(|&(lag, coef)| coef * shocks[t - lag])
                .sum();
            values.push(ar + ma);
            // Future innovations have zero expectation.
            shocks.push(0.0);
        }

        let differenced: Vec<f64> = values[m..].iter().map(|v| v + self.intercept).collect();
        integrate(&differenced, &self.tails)
    }

    /// Forecast standard errors for horizons `1..=steps`.
    pub fn forecast_std_errors(&self, steps: usize) -> Vec<f64> {
        let psi = self.psi_weights(steps);
        let mut cumulative = 0.0;
        psi.iter()
            .map(|weight| {
                cumulative += weight * weight;
                (self.sigma2 * cumulative).sqrt()
            })
            .collect()
    }

    /// MA(infinity) weights of the integrated model, `psi[0] = 1`.
    fn psi_weights(&self, steps: usize) -> Vec<f64> {
        let ar_poly = self.integrated_ar_polynomial();
        let ma_poly = lag_polynomial(&self.ma_terms, 1.0);

        let mut psi = Vec::with_capacity(steps);
        for j in 0..steps {
            let mut weight = ma_poly.get(j).copied().unwrap_or(0.0);
            for i in 1..ar_poly.len().min(j + 1) {
                weight -= ar_poly[i] * psi[j - i];
            }
            psi.push(weight);
        }
        psi
    }

    /// Coefficients of phi(B) (1 - B)^d, constant term first.
    fn integrated_ar_polynomial(&self) -> Vec<f64> {
        let mut poly = lag_polynomial(&self.ar_terms, -1.0);
        for _ in 0..self.order.d {
            poly = multiply_polynomials(&poly, &[1.0, -1.0]);
        }
        poly
    }
}

fn validate_series(series: &[f64]) -> Result<(), ModelFitError> {
    if series.len() < MIN_OBSERVATIONS {
        return Err(ModelFitError::InsufficientData {
            required: MIN_OBSERVATIONS,
            actual: series.len(),
        });
    }
    if let Some(index) = series.iter().position(|v| !v.is_finite()) {
        return Err(ModelFitError::InvalidValue(index));
    }
    if std_dev(series) <= degenerate_tolerance(series) {
        return Err(ModelFitError::Degenerate);
    }
    Ok(())
}

fn degenerate_tolerance(series: &[f64]) -> f64 {
    let scale = series.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    1e-9 * (1.0 + scale)
}

fn candidate_orders(d: usize) -> impl Iterator<Item = ArimaOrder> {
    (0..=MAX_P).flat_map(move |p| {
        (0..=MAX_Q).flat_map(move |q| {
            (0..=1).flat_map(move |seasonal_p| {
                (0..=1).map(move |seasonal_q| ArimaOrder {
                    p,
                    d,
                    q,
                    seasonal_p,
                    seasonal_q,
                    period: SEASONAL_PERIOD,
                })
            })
        })
    })
}

/// Hannan–Rissanen estimate of one candidate; `None` when inadmissible.
fn estimate(
    order: ArimaOrder,
    centered: &[f64],
    innovations: &[f64],
    start: usize,
    mean_params: usize,
) -> Option<Candidate> {
    let ar_lags = order.ar_lags();
    let ma_lags = order.ma_lags();
    let k = ar_lags.len() + ma_lags.len();

    let coefficients = if k == 0 {
        Vec::new()
    } else {
        let mut xtx = vec![vec![0.0; k]; k];
        let mut xty = vec![0.0; k];
        let mut row = vec![0.0; k];
        for t in start..centered.len() {
            for (slot, &lag) in ar_lags.iter().enumerate() {
                row[slot] = centered[t - lag];
            }
            for (slot, &lag) in ma_lags.iter().enumerate() {
                row[ar_lags.len() + slot] = innovations[t - lag];
            }
            for i in 0..k {
                xty[i] += row[i] * centered[t];
                for j in 0..k {
                    xtx[i][j] += row[i] * row[j];
                }
            }
        }
        solve_linear_system(xtx, xty)?
    };

    let (ar_coefs, ma_coefs) = coefficients.split_at(ar_lags.len());
    // Sufficient conditions for stationarity and invertibility.
    if ar_coefs.iter().map(|c| c.abs()).sum::<f64>() >= 1.0
        || ma_coefs.iter().map(|c| c.abs()).sum::<f64>() >= 1.0
    {
        return None;
    }

    let ar_terms: Vec<(usize, f64)> = ar_lags.iter().copied().zip(ar_coefs.iter().copied()).collect();
    let ma_terms: Vec<(usize, f64)> = ma_lags.iter().copied().zip(ma_coefs.iter().copied()).collect();

    // Conditional residuals, seeded with the long-AR innovations.
    let mut residuals = innovations[..start].to_vec();
    residuals.reserve(centered.len() - start);
    let mut sum_squares = 0.0;
    for t in start..centered.len() {
        let ar: f64 = ar_terms.iter().map(|&(lag, c)| c * centered[t - lag]).sum();
        let ma: f64 = ma_terms.iter().map(|&(lag, c)| c * residuals[t - lag]).sum();
        let residual = centered[t] - ar - ma;
        sum_squares += residual * residual;
        residuals.push(residual);
    }

    let n_effective = (centered.len() - start) as f64;
    let sigma2 = (sum_squares / n_effective).max(1e-12);
    if !sigma2.is_finite() {
        return None;
    }
    let parameters = (k + mean_params + 1) as f64;
    let aic = n_effective * sigma2.ln() + 2.0 * parameters;

    Some(Candidate {
        order,
        ar_terms,
        ma_terms,
        sigma2,
        aic,
        residuals,
    })
}

/// Residuals of a Yule–Walker autoregression of the given order.
fn long_ar_innovations(centered: &[f64], order: usize) -> Option<Vec<f64>> {
    let autocov = autocovariance(centered, order);
    let coefs = levinson_durbin(&autocov, order)?;

    let mut innovations = vec![0.0; centered.len()];
    for t in order..centered.len() {
        let fitted: f64 = coefs
            .iter()
            .enumerate()
            .map(|(j, c)| c * centered[t - j - 1])
            .sum();
        innovations[t] = centered[t] - fitted;
    }
    Some(innovations)
}

/// Increase `d` while the series still looks like a random walk and
/// differencing reduces its spread.
fn select_differencing(series: &[f64]) -> usize {
    let tolerance = degenerate_tolerance(series);
    let mut d = 0;
    let mut current = series.to_vec();
    while d < MAX_D {
        let next = difference(&current, 1);
        let next_sd = std_dev(&next);
        if lag_one_autocorrelation(&current) <= UNIT_ROOT_ACF
            || next_sd <= tolerance
            || next_sd >= std_dev(&current)
        {
            break;
        }
        current = next;
        d += 1;
    }
    d
}

/// Applies `order` rounds of first differencing.
pub fn difference(series: &[f64], order: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..order {
        result = result.windows(2).map(|pair| pair[1] - pair[0]).collect();
    }
    result
}

/// Undoes differencing using the last value of each level.
fn integrate(differenced: &[f64], tails: &[f64]) -> Vec<f64> {
    let mut values = differenced.to_vec();
    for &last in tails.iter().rev() {
        let mut running = last;
        values = values
            .iter()
            .map(|v| {
                running += v;
                running
            })
            .collect();
    }
    values
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mu = mean(values);
    let variance = values.iter().map(|v| (v - mu).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

fn lag_one_autocorrelation(values: &[f64]) -> f64 {
    let mu = mean(values);
    let denom: f64 = values.iter().map(|v| (v - mu).powi(2)).sum();
    if denom <= 0.0 {
        return 0.0;
    }
    let numer: f64 = values
        .windows(2)
        .map(|pair| (pair[0] - mu) * (pair[1] - mu))
        .sum();
    numer / denom
}

/// Biased autocovariances `r[0..=max_lag]` of an already centered series.
fn autocovariance(centered: &[f64], max_lag: usize) -> Vec<f64> {
    let n = centered.len() as f64;
    (0..=max_lag)
        .map(|k| {
            centered[k..]
                .iter()
                .zip(centered)
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / n
        })
        .collect()
}

/// Solves the Yule–Walker equations; `coefs[j]` multiplies lag `j + 1`.
fn levinson_durbin(autocov: &[f64], order: usize) -> Option<Vec<f64>> {
    if autocov[0] <= 0.0 {
        return None;
    }
    let mut coefs = vec![0.0; order];
    let mut error = autocov[0];
    for k in 0..order {
        let mut acc = autocov[k + 1];
        for j in 0..k {
            acc -= coefs[j] * autocov[k - j];
        }
        let reflection = acc / error;
        let previous = coefs.clone();
        coefs[k] = reflection;
        for j in 0..k {
            coefs[j] = previous[j] - reflection * previous[k - 1 - j];
        }
        error *= 1.0 - reflection * reflection;
        if error <= 0.0 {
            return None;
        }
    }
    Some(coefs)
}

/// Gaussian elimination with partial pivoting; `None` for singular systems.
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    let scale = (0..n).fold(0.0_f64, |acc, i| acc.max(a[i][i].abs()));
    if scale == 0.0 {
        return None;
    }

    for col in 0..n {
        let pivot = (col..n).max_by_key(|&row| OrderedFloat(a[row][col].abs()))?;
        if a[pivot][col].abs() <= 1e-12 * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Dense polynomial `1 + sign * sum(c * B^lag)`.
fn lag_polynomial(terms: &[(usize, f64)], sign: f64) -> Vec<f64> {
    let degree = terms.iter().map(|&(lag, _)| lag).max().unwrap_or(0);
    let mut poly = vec![0.0; degree + 1];
    poly[0] = 1.0;
    for &(lag, coef) in terms {
        poly[lag] += sign * coef;
    }
    poly
}

fn multiply_polynomials(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut product = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            product[i + j] += x * y;
        }
    }
    product
}
