//! End-to-end engine tests on a synthetic panel.

mod common;

use approx::assert_relative_eq;
use common::{synthetic_panel, valuation, ANNUAL, QUARTERLY, UNVACCINATED};
use vaccine_value::core::CoverageKind;
use vaccine_value::prelude::*;

fn options(n_draws: usize) -> EngineOptions {
    EngineOptions::builder().n_draws(n_draws).build().unwrap()
}

fn engine(noise: f64, n_draws: usize) -> Engine {
    Engine::fit(synthetic_panel(noise, 7), options(n_draws)).expect("engine should fit")
}

// ============================================================================
// Fitting
// ============================================================================

#[test]
fn test_all_models_fitted() {
    let engine = engine(1.0, 10);

    assert_eq!(engine.health().system().equations().len(), 2);
    assert!(!engine.quarterly_gdp().sample().is_empty());
    let annual = engine.annual_gdp().expect("annual model should be fitted");
    assert_eq!(annual.observations().len(), ANNUAL.len());
}

#[test]
fn test_annual_gdp_countries_not_in_quarterly_sample() {
    let engine = engine(1.0, 10);
    let panel = engine.panel();
    for name in ANNUAL {
        let c = panel.country_index(name).unwrap();
        assert!(engine
            .quarterly_gdp()
            .sample()
            .kept
            .iter()
            .all(|&i| panel.country_of(i) != c));
    }
}

#[test]
fn test_panel_without_annual_rows_skips_annual_model() {
    let mut rows = synthetic_panel(1.0, 3).rows().to_vec();
    rows.retain(|r| !ANNUAL.contains(&r.country.as_str()));
    let panel = Panel::new(rows).unwrap();

    let engine = Engine::fit(panel, options(10)).unwrap();
    assert!(engine.annual_gdp().is_none());

    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();
    assert!(basecase.evaluation.annual_gdp.is_none());
    assert_relative_eq!(basecase.summary.scenarios.no_target.totals.annual_gdp, 0.0);
}

#[test]
fn test_invalid_options_rejected() {
    let opts = EngineOptions::builder().n_draws(0).build_unchecked();
    let result = Engine::fit(synthetic_panel(1.0, 7), opts);
    assert!(matches!(result, Err(EngineError::Options(_))));
}

// ============================================================================
// Basecase
// ============================================================================

#[test]
fn test_vaccination_averts_infections() {
    let engine = engine(1.0, 10);
    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();
    let totals = basecase.evaluation.totals();

    assert!(totals.no_target.infections > 0.0);
    assert!(totals.no_vaccination.infections > totals.no_target.infections);
}

#[test]
fn test_country_totals_sum_to_global() {
    let engine = engine(1.0, 10);
    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();

    for c in Counterfactual::ALL {
        let global = &basecase.summary.scenarios.get(c).totals;
        let full: f64 = basecase.evaluation.countries.iter().map(|cv| cv.totals.get(c).full_value).sum();
        let infections: f64 = basecase
            .evaluation
            .countries
            .iter()
            .map(|cv| cv.totals.get(c).quarterly.infections)
            .sum();

        assert_relative_eq!(full, global.full_value, max_relative = 1e-10);
        assert_relative_eq!(infections, basecase.evaluation.health.infections.total(c), max_relative = 1e-10);
        assert_relative_eq!(
            global.full_value,
            global.quarterly.quarterly_value + global.annual_gdp,
            max_relative = 1e-10
        );
    }
}

#[test]
fn test_unvaccinated_country_contributes_zero() {
    let engine = engine(1.0, 10);
    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();

    let row = basecase
        .evaluation
        .countries
        .iter()
        .find(|cv| cv.country == UNVACCINATED)
        .expect("unvaccinated country should be reported");
    for c in Counterfactual::ALL {
        let t = row.totals.get(c);
        assert_relative_eq!(t.quarterly.infections, 0.0, epsilon = 1e-6);
        assert_relative_eq!(t.quarterly.deaths, 0.0, epsilon = 1e-6);
        assert_relative_eq!(t.quarterly.quarterly_gdp, 0.0, epsilon = 1e-3);
        assert_relative_eq!(t.full_value, 0.0, epsilon = 1e-3);
    }
    assert!(basecase
        .coverage
        .of_kind(CoverageKind::NoTimeline)
        .any(|n| n.country == UNVACCINATED));
}

#[test]
fn test_gdp_per_dose_between_components() {
    let engine = engine(1.0, 10);
    let summary = engine.basecase(&valuation(engine.panel())).unwrap().summary;

    for c in Counterfactual::ALL {
        let s = summary.scenarios.get(c);
        let lo = s.quarterly_gdp_per_dose.min(s.annual_gdp_per_dose);
        let hi = s.quarterly_gdp_per_dose.max(s.annual_gdp_per_dose);
        assert!(s.gdp_per_dose >= lo - 1e-9 && s.gdp_per_dose <= hi + 1e-9);
        assert_relative_eq!(s.value_per_dose, s.health_value_per_dose + s.gdp_per_dose, max_relative = 1e-12);
    }
}

#[test]
fn test_no_vaccination_counts_more_doses() {
    let engine = engine(1.0, 10);
    let summary = engine.basecase(&valuation(engine.panel())).unwrap().summary;

    let target = &summary.scenarios.no_target;
    let all = &summary.scenarios.no_vaccination;
    assert!(target.health.doses > 0.0);
    assert!(all.health.doses > target.health.doses);
    assert!(all.annual_gdp.doses > target.annual_gdp.doses);
}

#[test]
fn test_coefficients_and_diagnostics_reported() {
    let engine = engine(1.0, 10);
    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();

    let equations: Vec<&str> = basecase.diagnostics.iter().map(|(e, _)| e.as_str()).collect();
    assert_eq!(equations, vec!["infections", "deaths", "quarterly_gdp"]);
    assert!(basecase.coefficients.get("L1_uptake_target").is_some());
    assert!(basecase.coefficients.get("cv_target").is_some());
}

#[test]
fn test_coverage_records_sample_exclusions() {
    let engine = engine(1.0, 10);
    let basecase = engine.basecase(&valuation(engine.panel())).unwrap();
    // the first rows of every country lack infection lags
    assert!(basecase.coverage.n_excluded_rows() > 0);
}

#[test]
fn test_missing_valuation_noted_not_fatal() {
    let engine = engine(1.0, 10);
    let full = valuation(engine.panel());

    // no multipliers for the first quarterly country
    let mut inputs = ValuationInputs::new();
    for row in engine.panel().rows().iter().filter(|r| r.country != QUARTERLY[0]) {
        if let Some(m) = full.multipliers(&row.country, row.period) {
            inputs.insert_multipliers(row.country.clone(), row.period, *m);
        }
    }
    for name in engine.panel().countries() {
        if let Some(fi) = full.full_income(name) {
            inputs.insert_full_income(name.clone(), fi);
        }
    }

    let basecase = engine.basecase(&inputs).unwrap();
    assert!(basecase
        .coverage
        .of_kind(CoverageKind::MissingMultiplier)
        .any(|n| n.country == QUARTERLY[0]));
    assert!(basecase.summary.scenarios.no_target.totals.full_value.is_finite());
}

// ============================================================================
// Uncertainty
// ============================================================================

#[test]
fn test_same_seed_same_percentiles() {
    let a = engine(1.0, 50);
    let b = Engine::fit(
        synthetic_panel(1.0, 7),
        EngineOptions::builder().n_draws(50).n_threads(1).build().unwrap(),
    )
    .unwrap();

    let ua = a.uncertainty(&valuation(a.panel())).unwrap();
    let ub = b.uncertainty(&valuation(b.panel())).unwrap();
    assert_eq!(ua.percentiles, ub.percentiles);
    assert_eq!(ua.draws.len(), 50);
}

#[test]
fn test_different_seed_different_draws() {
    let a = engine(1.0, 20);
    let b = Engine::fit(
        synthetic_panel(1.0, 7),
        EngineOptions::builder().n_draws(20).seed(1).build().unwrap(),
    )
    .unwrap();

    let da = a.draws().unwrap();
    let db = b.draws().unwrap();
    assert_ne!(da[0].vectors[0][1], db[0].vectors[0][1]);
}

#[test]
fn test_draw_out_of_range() {
    let engine = engine(1.0, 5);
    let result = engine.evaluate(CoefficientSource::Draw(5), &valuation(engine.panel()));
    assert!(matches!(result, Err(EngineError::DrawOutOfRange { index: 5, n_draws: 5 })));
}

#[test]
fn test_percentiles_bracket_median() {
    let engine = engine(1.0, 200);
    let report = engine.uncertainty(&valuation(engine.panel())).unwrap();

    for c in Counterfactual::ALL {
        for m in Measure::ALL {
            let lo = report.percentiles.get(c, m, 2.5).unwrap();
            let mid = report.percentiles.get(c, m, 50.0).unwrap();
            let hi = report.percentiles.get(c, m, 97.5).unwrap();
            assert!(lo <= mid && mid <= hi, "{c} {m}: {lo} {mid} {hi}");
        }
    }
}

#[test]
fn test_exact_fit_collapses_interval_to_basecase() {
    // noise-free data leaves zero residuals and a degenerate covariance
    let engine = engine(0.0, 1000);
    let inputs = valuation(engine.panel());
    let report = engine.run(&inputs).unwrap();

    assert!(report.uncertainty.failed.is_empty());
    assert_eq!(report.uncertainty.draws.len(), 1000);

    let basecase: PerScenario<_> = report.basecase.evaluation.totals();
    for c in Counterfactual::ALL {
        for m in Measure::ALL {
            let expected = m.of(basecase.get(c));
            for p in [2.5, 50.0, 97.5] {
                let value = report.uncertainty.percentiles.get(c, m, p).unwrap();
                assert_relative_eq!(value, expected, epsilon = 1e-6, max_relative = 1e-6);
            }
        }
    }
}
