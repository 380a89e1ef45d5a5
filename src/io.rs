//! CSV adapters for inputs and outputs.
//!
//! Inputs: the panel (one row per country-quarter, columns named after
//! [`PanelObservation`] fields, periods as `YYYY_Qn`, empty cells for missing
//! values), per-country-quarter valuation multipliers, full income and
//! reference population. Outputs are flat tables, one record per line.

use crate::aggregation::{
    CountryValue, GlobalSummary, Multipliers, PercentileRow, ScenarioSummary, ValuationInputs, ValueComponents,
    ValuedTable,
};
use crate::core::{Counterfactual, CoverageNote, CoverageReport, Panel, PanelError, PanelObservation, Period};
use crate::diagnostics::BreuschPagan;
use crate::inference::CoefficientRow;
use crate::models::AnnualGdpTable;
use crate::simulation::AvertedTable;
use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Panel(#[from] PanelError),
}

fn read_records<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, IoError> {
    let mut reader = ReaderBuilder::new().has_headers(true).trim(csv::Trim::All).from_reader(reader);
    let mut out = Vec::new();
    for record in reader.deserialize() {
        out.push(record?);
    }
    Ok(out)
}

fn write_records<T: Serialize, W: Write>(writer: W, records: impl IntoIterator<Item = T>) -> Result<(), IoError> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read and validate a panel.
pub fn read_panel<R: Read>(reader: R) -> Result<Panel, IoError> {
    let rows: Vec<PanelObservation> = read_records(reader)?;
    info!(rows = rows.len(), "panel read");
    Ok(Panel::new(rows)?)
}

pub fn read_panel_path(path: impl AsRef<Path>) -> Result<Panel, IoError> {
    read_panel(File::open(path)?)
}

#[derive(Debug, Deserialize)]
struct MultiplierRecord {
    country: String,
    period: Period,
    #[serde(default)]
    qaly_nonfatal: f64,
    #[serde(default)]
    qaly_fatal: f64,
    #[serde(default)]
    direct_cost: f64,
    #[serde(default)]
    indirect_cost_nonfatal: f64,
    #[serde(default)]
    indirect_cost_fatal: f64,
    #[serde(default)]
    unpaid_work_loss: f64,
}

#[derive(Debug, Deserialize)]
struct CountryValueRecord {
    country: String,
    value: f64,
}

/// Assemble valuation inputs from three readers.
///
/// `multipliers`: country, period and the [`Multipliers`] fields.
/// `full_income` and `reference_population`: `country,value`.
pub fn read_valuation<A: Read, B: Read, C: Read>(
    multipliers: A,
    full_income: B,
    reference_population: C,
) -> Result<ValuationInputs, IoError> {
    let mut inputs = ValuationInputs::new();
    for r in read_records::<MultiplierRecord, _>(multipliers)? {
        inputs.insert_multipliers(
            r.country,
            r.period,
            Multipliers {
                qaly_nonfatal: r.qaly_nonfatal,
                qaly_fatal: r.qaly_fatal,
                direct_cost: r.direct_cost,
                indirect_cost_nonfatal: r.indirect_cost_nonfatal,
                indirect_cost_fatal: r.indirect_cost_fatal,
                unpaid_work_loss: r.unpaid_work_loss,
            },
        );
    }
    for r in read_records::<CountryValueRecord, _>(full_income)? {
        inputs.insert_full_income(r.country, r.value);
    }
    for r in read_records::<CountryValueRecord, _>(reference_population)? {
        inputs.insert_reference_population(r.country, r.value);
    }
    Ok(inputs)
}

#[derive(Serialize)]
struct AvertedRecord<'a> {
    outcome: String,
    country: &'a str,
    period: Period,
    predicted_observed: f64,
    predicted_no_target: f64,
    predicted_no_vaccination: f64,
    averted_no_target: f64,
    averted_no_vaccination: f64,
}

/// Per-country-quarter averted outcomes of one or more tables.
pub fn write_averted<W: Write>(writer: W, tables: &[&AvertedTable]) -> Result<(), IoError> {
    let records = tables.iter().flat_map(|t| {
        t.rows.iter().map(move |r| AvertedRecord {
            outcome: t.outcome.to_string(),
            country: &r.country,
            period: r.period,
            predicted_observed: r.predicted_observed,
            predicted_no_target: r.predicted.no_target,
            predicted_no_vaccination: r.predicted.no_vaccination,
            averted_no_target: r.averted.no_target,
            averted_no_vaccination: r.averted.no_vaccination,
        })
    });
    write_records(writer, records)
}

#[derive(Serialize)]
struct AnnualRecord<'a> {
    country: &'a str,
    predicted_observed: f64,
    predicted_no_target: f64,
    predicted_no_vaccination: f64,
    averted_no_target: f64,
    averted_no_vaccination: f64,
    projected_gdp: f64,
    doses_target: f64,
    doses_all: f64,
}

pub fn write_annual<W: Write>(writer: W, table: &AnnualGdpTable) -> Result<(), IoError> {
    write_records(
        writer,
        table.rows.iter().map(|r| AnnualRecord {
            country: &r.country,
            predicted_observed: r.predicted_observed,
            predicted_no_target: r.predicted.no_target,
            predicted_no_vaccination: r.predicted.no_vaccination,
            averted_no_target: r.averted.no_target,
            averted_no_vaccination: r.averted.no_vaccination,
            projected_gdp: r.projected_gdp,
            doses_target: r.doses.no_target,
            doses_all: r.doses.no_vaccination,
        }),
    )
}

#[derive(Serialize)]
struct ValueRecord<'a> {
    country: &'a str,
    period: Option<Period>,
    scenario: Counterfactual,
    infections: f64,
    deaths: f64,
    nonfatal: f64,
    qalys: f64,
    monetized_qalys: f64,
    direct_costs: f64,
    indirect_costs: f64,
    unpaid_work: f64,
    health_value: f64,
    quarterly_gdp: f64,
    quarterly_value: f64,
    annual_gdp: Option<f64>,
    full_value: Option<f64>,
    doses: f64,
}

impl<'a> ValueRecord<'a> {
    fn new(country: &'a str, period: Option<Period>, scenario: Counterfactual, v: &ValueComponents, doses: f64) -> Self {
        Self {
            country,
            period,
            scenario,
            infections: v.infections,
            deaths: v.deaths,
            nonfatal: v.nonfatal,
            qalys: v.qalys,
            monetized_qalys: v.monetized_qalys,
            direct_costs: v.direct_costs,
            indirect_costs: v.indirect_costs,
            unpaid_work: v.unpaid_work,
            health_value: v.health_value,
            quarterly_gdp: v.quarterly_gdp,
            quarterly_value: v.quarterly_value,
            annual_gdp: None,
            full_value: None,
            doses,
        }
    }
}

/// Valued country-quarters, one line per row and counterfactual.
pub fn write_valued<W: Write>(writer: W, table: &ValuedTable) -> Result<(), IoError> {
    let records = table.rows.iter().flat_map(|r| {
        Counterfactual::ALL
            .into_iter()
            .map(move |c| ValueRecord::new(&r.country, Some(r.period), c, r.value.get(c), *r.doses.get(c)))
    });
    write_records(writer, records)
}

/// Country totals, one line per country and counterfactual.
pub fn write_countries<W: Write>(writer: W, countries: &[CountryValue]) -> Result<(), IoError> {
    let records = countries.iter().flat_map(|cv| {
        Counterfactual::ALL.into_iter().map(move |c| {
            let t = cv.totals.get(c);
            let mut record = ValueRecord::new(&cv.country, None, c, &t.quarterly, t.doses);
            record.annual_gdp = Some(t.annual_gdp);
            record.full_value = Some(t.full_value);
            record
        })
    });
    write_records(writer, records)
}

#[derive(Serialize)]
struct MetricRecord {
    scenario: Counterfactual,
    metric: &'static str,
    value: f64,
}

fn summary_metrics(s: &ScenarioSummary) -> [(&'static str, f64); 25] {
    [
        ("full_value", s.totals.full_value),
        ("quarterly_value", s.totals.quarterly.quarterly_value),
        ("health_value", s.totals.quarterly.health_value),
        ("monetized_qalys", s.totals.quarterly.monetized_qalys),
        ("direct_costs", s.totals.quarterly.direct_costs),
        ("indirect_costs", s.totals.quarterly.indirect_costs),
        ("unpaid_work", s.totals.quarterly.unpaid_work),
        ("quarterly_gdp", s.totals.quarterly.quarterly_gdp),
        ("annual_gdp", s.totals.annual_gdp),
        ("infections", s.totals.quarterly.infections),
        ("deaths", s.totals.quarterly.deaths),
        ("health_doses", s.health.doses),
        ("quarterly_gdp_doses", s.quarterly_gdp.doses),
        ("annual_gdp_doses", s.annual_gdp.doses),
        ("health_value_per_dose", s.health_value_per_dose),
        ("quarterly_gdp_per_dose", s.quarterly_gdp_per_dose),
        ("annual_gdp_per_dose", s.annual_gdp_per_dose),
        ("gdp_per_dose", s.gdp_per_dose),
        ("value_per_dose", s.value_per_dose),
        ("health_value_per_capita", s.health_value_per_capita),
        ("gdp_per_capita", s.gdp_per_capita),
        ("value_per_capita", s.value_per_capita),
        ("effectiveness_year", s.effectiveness.year as f64),
        ("effectiveness_infections", s.effectiveness.infections),
        ("effectiveness_deaths", s.effectiveness.deaths),
    ]
}

/// Global summary in long format: scenario, metric, value.
pub fn write_summary<W: Write>(writer: W, summary: &GlobalSummary) -> Result<(), IoError> {
    let records = Counterfactual::ALL.into_iter().flat_map(|c| {
        summary_metrics(summary.scenarios.get(c))
            .into_iter()
            .map(move |(metric, value)| MetricRecord {
                scenario: c,
                metric,
                value,
            })
    });
    write_records(writer, records)
}

pub fn write_percentiles<W: Write>(writer: W, rows: &[PercentileRow]) -> Result<(), IoError> {
    write_records(writer, rows)
}

pub fn write_coefficients<W: Write>(writer: W, rows: &[CoefficientRow]) -> Result<(), IoError> {
    write_records(writer, rows)
}

#[derive(Serialize)]
struct DiagnosticRecord<'a> {
    equation: &'a str,
    lm_statistic: f64,
    lm_pvalue: f64,
    f_statistic: f64,
    f_pvalue: f64,
    df_model: usize,
    df_resid: usize,
}

pub fn write_diagnostics<W: Write>(writer: W, tests: &[(String, BreuschPagan)]) -> Result<(), IoError> {
    write_records(
        writer,
        tests.iter().map(|(equation, bp)| DiagnosticRecord {
            equation,
            lm_statistic: bp.lm_statistic,
            lm_pvalue: bp.lm_pvalue,
            f_statistic: bp.f_statistic,
            f_pvalue: bp.f_pvalue,
            df_model: bp.df_model,
            df_resid: bp.df_resid,
        }),
    )
}

#[derive(Serialize)]
struct ExclusionRecord<'a> {
    sample: &'a str,
    country: &'a str,
    period: Period,
    reason: String,
}

/// Coverage report as two tables: excluded rows and notes.
pub fn write_coverage<W1: Write, W2: Write>(exclusions: W1, notes: W2, report: &CoverageReport) -> Result<(), IoError> {
    let records = report.exclusions.iter().flat_map(|(sample, rows)| {
        rows.iter().map(move |e| ExclusionRecord {
            sample,
            country: &e.country,
            period: e.period,
            reason: e.reason.to_string(),
        })
    });
    write_records(exclusions, records)?;
    write_records::<&CoverageNote, _>(notes, &report.notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::GdpSeries;

    const PANEL: &str = "\
country,period,infection_rate,death_rate,gdp_gap,gdp_projected_usd,gdp_series,population,uptake,uptake_target,cum_uptake,cum_uptake_target,response_index,response_index_lag1
B,2021_Q1,0.02,0.001,,,,500,0.1,0.05,0.1,0.05,40,38
A,2021_Q2,0.01,,-0.03,1e9,quarterly,1000,0,0,0,0,50,
A,2021_Q1,0.01,0.0005,-0.04,1e9,quarterly,1000,0,0,0,0,55,60
";

    #[test]
    fn test_read_panel_with_missing_cells() {
        let panel = read_panel(PANEL.as_bytes()).unwrap();
        assert_eq!(panel.len(), 3);
        let a2 = panel.row(1);
        assert_eq!(a2.country, "A");
        assert_eq!(a2.period, Period::new(2021, 2).unwrap());
        assert_eq!(a2.death_rate, None);
        assert_eq!(a2.response_index_lag1, None);
        assert_eq!(a2.gdp_series, Some(GdpSeries::Quarterly));
        assert_eq!(panel.row(2).gdp_series, None);
    }

    #[test]
    fn test_read_valuation() {
        let multipliers = "country,period,qaly_nonfatal,qaly_fatal,direct_cost,indirect_cost_nonfatal,indirect_cost_fatal,unpaid_work_loss\nA,2021_Q1,0.01,12,100,5,900,3\n";
        let income = "country,value\nA,50000\n";
        let population = "country,value\nA,1000000\n";
        let inputs = read_valuation(multipliers.as_bytes(), income.as_bytes(), population.as_bytes()).unwrap();

        let m = inputs.multipliers("A", Period::new(2021, 1).unwrap()).unwrap();
        assert_eq!(m.qaly_fatal, 12.0);
        assert_eq!(inputs.full_income("A"), Some(50000.0));
        assert_eq!(inputs.reference_population("B"), None);
    }

    #[test]
    fn test_duplicate_panel_rows_rejected() {
        let text = "country,period,infection_rate,death_rate,gdp_gap,gdp_projected_usd,gdp_series,population,uptake,uptake_target,cum_uptake,cum_uptake_target,response_index,response_index_lag1\nA,2021_Q1,,,,,,10,0,0,0,0,,\nA,2021_Q1,,,,,,10,0,0,0,0,,\n";
        assert!(matches!(read_panel(text.as_bytes()), Err(IoError::Panel(PanelError::DuplicateKey { .. }))));
    }

    #[test]
    fn test_write_percentiles() {
        let rows = vec![PercentileRow {
            scenario: Counterfactual::NoTarget,
            measure: crate::aggregation::Measure::FullValue,
            percentile: 50.0,
            value: 1.5,
        }];
        let mut out = Vec::new();
        write_percentiles(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "scenario,measure,percentile,value\nno_target,full_value,50.0,1.5\n");
    }
}
