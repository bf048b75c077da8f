//! Multi-year scenarios across policy, records, ledgers and calculators

use std::sync::Arc;

use approx::assert_relative_eq;
use taxsim::records::{CarryforwardSpec, PanelBlowupTable, PanelConfig};
use taxsim::{
    AdvanceMode, Calculator, DataTable, FilingPopulation, GrowthFactorTable, ParameterStore,
    PopulationKind, Reform, ReformFile, ReformValue, TaxError, VariableSchema, WeightTable,
};

fn growth() -> Arc<GrowthFactorTable> {
    Arc::new(GrowthFactorTable::default_table().unwrap())
}

fn current_law() -> ParameterStore {
    ParameterStore::current_law(&growth()).unwrap()
}

fn cross_section(kind: PopulationKind, csv: &str, weights: Option<WeightTable>) -> FilingPopulation {
    FilingPopulation::from_source(
        Arc::new(VariableSchema::default_for(kind).unwrap()),
        DataTable::from_reader(csv.as_bytes()).unwrap().into(),
        weights,
        2017,
        AdvanceMode::CrossSection {
            growth: Some(growth()),
        },
    )
    .unwrap()
}

/// Unit blow-up factors for every column the corporate schema uses
fn flat_blowup() -> Arc<PanelBlowupTable> {
    let header = "YEAR,AGGREGATE_LIABILTY,INCOME_HP,PRFT_GAIN_BP_OTHR_SPECLTV_BUS,\
                  PRFT_GAIN_BP_SPECLTV_BUS,PRFT_GAIN_BP_SPCFD_BUS,ST_CG_AMT_1,ST_CG_AMT_2,\
                  LT_CG_AMT_1,LT_CG_AMT_2,ST_CG_AMT_APPRATE,TOTAL_INCOME_OS,CYL_SET_OFF,\
                  TOTAL_DEDUC_VIA,DEDUCT_SEC_10A_OR_10AA,NET_AGRC_INCOME,INVESTMENT";
    let ones = vec!["1.0"; 16].join(",");
    let csv = format!("{}\n2021,{}\n2022,{}\n", header, ones, ones);
    Arc::new(PanelBlowupTable::from_reader(csv.as_bytes()).unwrap())
}

fn corporate_panel(csv: &str, weights: Option<WeightTable>) -> FilingPopulation {
    let config = PanelConfig::new(flat_blowup(), CarryforwardSpec::corporate_default());
    FilingPopulation::from_source(
        Arc::new(VariableSchema::cit_default().unwrap()),
        DataTable::from_reader(csv.as_bytes()).unwrap().into(),
        weights,
        2017,
        AdvanceMode::Panel(config),
    )
    .unwrap()
}

#[test]
fn flat_five_percent_schedule() {
    let mut reform = Reform::new();
    for key in ["_rate1", "_rate2", "_rate3", "_rate4"] {
        reform.set(key, 2017, ReformValue::Values(vec![0.05]));
    }
    reform
        .set("_rebate_ceiling", 2017, ReformValue::Values(vec![0.0]))
        .set("_cess_rate", 2017, ReformValue::Values(vec![0.0]));
    let mut policy = current_law();
    policy.implement_reform(&reform).unwrap();

    let records = cross_section(
        PopulationKind::Individual,
        "FILING_SEQ_NO,AGEGRP,SALARIES\n1,0,100000\n",
        None,
    );
    let mut calc = Calculator::new(policy, vec![records]).unwrap();
    calc.calc_all().unwrap();

    let get = |v: &str| calc.array(PopulationKind::Individual, v).unwrap()[0];
    assert_eq!(get("TTI"), 100_000.0);
    assert_eq!(get("TI_special_rates"), 0.0);
    assert_relative_eq!(get("pitax"), 5_000.0, epsilon = 1e-9);
}

#[test]
fn panel_losses_carry_and_entrants_start_clean() {
    let csv = "ID_NO,ASSESSMENT_YEAR,INCOME_HP,CYL_SET_OFF,LOSS_LAG1\n\
               1,2017,100,400,0\n\
               2,2017,1500,0,1000\n\
               1,2018,1000,0,999\n\
               3,2018,200,0,777\n";
    let mut calc = Calculator::new(current_law(), vec![corporate_panel(csv, None)]).unwrap();
    calc.calc_all().unwrap();

    let get = |c: &Calculator, v: &str| c.array(PopulationKind::Corporate, v).unwrap();
    assert_eq!(get(&calc, "GTI"), vec![0.0, 500.0]);
    assert_eq!(get(&calc, "newloss1"), vec![300.0, 0.0]);
    assert_eq!(get(&calc, "newloss2"), vec![0.0, 0.0]);

    calc.increment_year().unwrap();
    calc.calc_all().unwrap();
    let records = calc.records(PopulationKind::Corporate).unwrap();
    assert_eq!(records.panel_year(), Some(2018));
    // entity 2 has left the panel, entity 3 joins with no history
    assert_eq!(records.int("ID_NO").unwrap(), &[1, 3]);
    assert_eq!(records.float("LOSS_LAG1").unwrap(), &[300.0, 0.0]);
    assert_eq!(get(&calc, "GTI"), vec![700.0, 200.0]);
    assert_eq!(records.int("ASSESSMENT_YEAR").unwrap(), &[2018, 2018]);

    let err = calc.increment_year().unwrap_err();
    assert!(matches!(err, TaxError::NoRemainingPanelYears { last_panel_year: 2018 }));
    assert_eq!(calc.current_year(), 2018);
}

#[test]
fn mat_credit_carries_between_panel_years() {
    let csv = "ID_NO,ASSESSMENT_YEAR,INCOME_HP,TAX_UNDER_SEC115JB_CURR_ASSTYR\n\
               1,2017,1000,500\n\
               1,2018,1000,0\n";
    let mut calc = Calculator::new(current_law(), vec![corporate_panel(csv, None)]).unwrap();
    calc.calc_all().unwrap();
    let normal_2017 = 1000.0 * 0.3 * 1.03;
    let credit = calc.array(PopulationKind::Corporate, "NEW_MAT_CR1").unwrap()[0];
    assert_relative_eq!(credit, 500.0 - normal_2017, epsilon = 1e-9);

    calc.increment_year().unwrap();
    calc.calc_all().unwrap();
    let get = |v: &str| calc.array(PopulationKind::Corporate, v).unwrap()[0];
    assert_relative_eq!(get("MAT_LAG1"), credit, epsilon = 1e-9);
    // 2018 cess is 4%
    assert_relative_eq!(get("citax"), 1000.0 * 0.3 * 1.04, epsilon = 1e-9);
    assert_relative_eq!(get("MAT_UTIL"), credit, epsilon = 1e-9);
    assert_eq!(get("NEW_MAT_CR2"), 0.0);
}

#[test]
fn subsample_weights_reconcile_to_full_total() {
    let full = DataTable::from_reader(
        "FILING_SEQ_NO,AGEGRP,SALARIES\n1,0,100\n2,0,200\n3,0,300\n4,0,400\n".as_bytes(),
    )
    .unwrap();
    let weights = WeightTable::from_reader("WT2017,WT2018\n1,2\n2,2\n3,2\n4,2\n".as_bytes()).unwrap();
    let records = FilingPopulation::from_source(
        Arc::new(VariableSchema::pit_default().unwrap()),
        full.select_rows(&[0, 2]).unwrap().into(),
        Some(weights),
        2017,
        AdvanceMode::CrossSection {
            growth: Some(growth()),
        },
    )
    .unwrap();
    let mut calc = Calculator::new(current_law(), vec![records]).unwrap();
    assert_relative_eq!(calc.total_weight(PopulationKind::Individual).unwrap(), 10.0, epsilon = 1e-9);
    calc.increment_year().unwrap();
    assert_relative_eq!(calc.total_weight(PopulationKind::Individual).unwrap(), 8.0, epsilon = 1e-9);
}

#[test]
fn reforms_cannot_reach_back() {
    let records = cross_section(
        PopulationKind::Individual,
        "FILING_SEQ_NO,AGEGRP,SALARIES\n1,0,800000\n",
        None,
    );
    let mut calc = Calculator::new(current_law(), vec![records]).unwrap();
    calc.advance_to_year(2019).unwrap();

    let past = Reform::new().with("_rate3", 2018, ReformValue::Values(vec![0.25]));
    let err = calc.implement_reform(&past).unwrap_err();
    assert!(matches!(err, TaxError::RetroactiveReform { year: 2018, current: 2019 }));
    assert!(err.is_temporal());

    let file = ReformFile::parse(r#"{"policy": {"_rate3": {"2019": [0.25]}}}"#).unwrap();
    calc.calc_all().unwrap();
    let before = calc.weighted_total("pitax").unwrap();
    calc.implement_reform(&file.policy).unwrap();
    calc.calc_all().unwrap();
    assert!(calc.weighted_total("pitax").unwrap() > before);
    assert_eq!(calc.policy().scalar("rate3", 2019).unwrap(), 0.25);
}

#[test]
fn all_three_taxes_in_one_calculator() {
    let calc_records = vec![
        cross_section(
            PopulationKind::Individual,
            "FILING_SEQ_NO,AGEGRP,SALARIES\n1,0,600000\n",
            None,
        ),
        cross_section(PopulationKind::Corporate, "ID_NO,INCOME_HP\n1,1000\n", None),
        cross_section(PopulationKind::Consumption, "ID_NO,CONS_OTHER\n1,100\n", None),
    ];
    let mut calc = Calculator::new(current_law(), calc_records).unwrap();
    calc.advance_to_year(2018).unwrap();
    calc.calc_all().unwrap();

    assert!(calc.weighted_total("pitax").unwrap() > 0.0);
    assert!(calc.weighted_total("citax").unwrap() > 0.0);
    // CONS_OTHER grows with CONSUMPTION (7%) into 2018
    assert_relative_eq!(calc.weighted_total("gst").unwrap(), 107.0 * 0.18, epsilon = 1e-9);
}
