//! Corporate income tax formula sequence

use super::common::{self, outputs, surcharge_band, BP_HEADS, CG_HEADS};
use super::formula::{Formula, FormulaSequence, Frame, Outputs, NONE};
use crate::error::TaxResult;
use crate::ledger::{self, LOSS_SLOTS, MAT_SLOTS};
use crate::records::panel::DEPRECIATION_BLOCKS;
use crate::records::PopulationKind;

const LIABILITY_OUTPUTS: [&str; 7] = [
    "Aggregate_Income",
    "tax_Aggregate_Income",
    "tax_TTI",
    "Total_Tax_Cap_Gains",
    "surcharge",
    "cess",
    "citax_before_mat",
];

fn numbered(stem: &str, count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("{}{}", stem, i)).collect()
}

/// Read several float inputs as per-entity slot vectors
fn slots(f: &Frame<'_>, names: &[String]) -> TaxResult<Vec<Vec<f64>>> {
    let columns = names
        .iter()
        .map(|n| f.var(n))
        .collect::<TaxResult<Vec<&[f64]>>>()?;
    Ok((0..f.len())
        .map(|i| columns.iter().map(|c| c[i]).collect())
        .collect())
}

/// Transpose per-entity slot vectors back into named columns
fn slot_columns(names: &[String], rows: &[Vec<f64>]) -> Outputs {
    names
        .iter()
        .enumerate()
        .map(|(k, name)| (name.clone(), rows.iter().map(|r| r[k]).collect()))
        .collect()
}

/// Written-down-value depreciation for one asset block
///
/// Additions held under 180 days depreciate at half rate.
fn depreciation_block(rate: u32) -> Formula {
    let wdv = format!("PWR_DOWN_VAL_1ST_DAY_PY_{}P", rate);
    let additions = format!("PADDTNS_180_DAYS__MOR_PY_{}P", rate);
    let sales = format!("PCR34_PY_{}P", rate);
    let late_additions = format!("PADDTNS_LESS_180_DAYS_{}P", rate);
    let late_sales = format!("PCR7_PY_{}P", rate);
    let extra = [
        format!("PADDTNL_DEPRECTN_ANY_4_{}P", rate),
        format!("PADDTNL_DEPRECTN_ANY_7_{}P", rate),
        format!("PADDTNL_DEPRECTN_LESS_180_DAYS_{}P", rate),
    ];
    let param = format!("dep_rate_pm{}", rate);
    let dep = format!("dep_amt_pm{}", rate);
    let close = format!("close_wdv_pm{}", rate);

    let mut inputs = vec![
        wdv.clone(),
        additions.clone(),
        sales.clone(),
        late_additions.clone(),
        late_sales.clone(),
    ];
    inputs.extend(extra.iter().cloned());

    Formula::new(
        &format!("depreciation_pm{}", rate),
        inputs,
        [param.clone()],
        [dep.clone(), close.clone()],
        move |f| {
            let r = f.scalar(&param)?;
            let (wdv, additions, sales) = (f.var(&wdv)?, f.var(&additions)?, f.var(&sales)?);
            let (late_add, late_sales) = (f.var(&late_additions)?, f.var(&late_sales)?);
            let extra = [f.var(&extra[0])?, f.var(&extra[1])?, f.var(&extra[2])?];

            let n = f.len();
            let mut dep_amt = Vec::with_capacity(n);
            let mut close_wdv = Vec::with_capacity(n);
            for i in 0..n {
                let full = wdv[i] + additions[i] - sales[i];
                let half = late_add[i] - late_sales[i];
                let d = full * r + half * (r / 2.0) + extra.iter().map(|e| e[i]).sum::<f64>();
                dep_amt.push(d);
                close_wdv.push(full + half - d);
            }
            Ok(vec![(dep.clone(), dep_amt), (close.clone(), close_wdv)])
        },
    )
}

fn total_depreciation() -> Formula {
    let blocks: Vec<String> = DEPRECIATION_BLOCKS
        .iter()
        .map(|r| format!("dep_amt_pm{}", r))
        .collect();
    Formula::new("depreciation_pm", blocks.clone(), NONE, ["dep_amt_pm"], move |f| {
        let names: Vec<&str> = blocks.iter().map(|s| s.as_str()).collect();
        Ok(vec![("dep_amt_pm".to_string(), f.sum(&names)?)])
    })
}

fn income_business_profession() -> Formula {
    let mut inputs = BP_HEADS.to_vec();
    inputs.push("dep_amt_pm");
    Formula::new("corp_income_business_profession", inputs, NONE, ["Income_BP"], |f| {
        let heads = f.sum(&BP_HEADS)?;
        let dep = f.var("dep_amt_pm")?;
        let income = heads.iter().zip(dep).map(|(h, d)| h - d).collect();
        Ok(vec![("Income_BP".to_string(), income)])
    })
}

fn gti_before_set_off() -> Formula {
    let mut heads = vec!["INCOME_HP", "Income_BP", "TOTAL_INCOME_OS"];
    heads.extend(CG_HEADS);
    let declared = heads.clone();
    Formula::new("corp_GTI_before_set_off", declared, NONE, ["GTI_Before_Loss"], move |f| {
        Ok(vec![("GTI_Before_Loss".to_string(), f.sum(&heads)?)])
    })
}

/// Set off current-year and brought-forward losses against income
fn gti_and_losses() -> Formula {
    let lags = numbered("LOSS_LAG", LOSS_SLOTS);
    let new_losses = numbered("newloss", LOSS_SLOTS);
    let mut inputs = vec!["GTI_Before_Loss".to_string(), "CY_Losses".to_string()];
    inputs.extend(lags.iter().cloned());
    let mut outs = vec!["GTI".to_string()];
    outs.extend(new_losses.iter().cloned());

    Formula::new("GTI_and_losses", inputs, ["Loss_CFLimit"], outs, move |f| {
        let limit = f.count("Loss_CFLimit")?;
        let gti_before = f.var("GTI_Before_Loss")?;
        let cy_losses = f.var("CY_Losses")?;
        let chains = slots(f, &lags)?;

        let mut gti = Vec::with_capacity(f.len());
        let mut next = Vec::with_capacity(f.len());
        for (i, chain) in chains.iter().enumerate() {
            let step = ledger::loss_step(gti_before[i], cy_losses[i], chain, limit);
            gti.push(step.gti);
            next.push(step.next_slots);
        }
        let mut out = vec![("GTI".to_string(), gti)];
        out.extend(slot_columns(&new_losses, &next));
        Ok(out)
    })
}

fn cit_liability() -> Formula {
    Formula::new(
        "cit_liability",
        [
            "TTI",
            "TI_special_rates",
            "tax_TI_special_rates",
            "Total_Tax_STCG",
            "Total_Tax_LTCG",
        ],
        ["cit_rate", "cit_surcharge_rate", "cit_surcharge_thd", "cess_rate"],
        LIABILITY_OUTPUTS,
        |f| {
            let rate = f.scalar("cit_rate")?;
            let surcharge_rates = f.row("cit_surcharge_rate")?;
            let surcharge_thd = f.row("cit_surcharge_thd")?;
            let cess_rate = f.scalar("cess_rate")?;
            let tti = f.var("TTI")?;
            let special = f.var("TI_special_rates")?;
            let special_tax = f.var("tax_TI_special_rates")?;
            let stcg = f.var("Total_Tax_STCG")?;
            let ltcg = f.var("Total_Tax_LTCG")?;

            let n = f.len();
            let mut cols: [Vec<f64>; 7] = Default::default();
            for i in 0..n {
                let taxinc = (tti[i] - special[i]).max(0.0);
                let tax_normal = rate * taxinc;
                let tax_tti = tax_normal + special_tax[i];
                let surcharge = tax_tti * surcharge_band(tti[i], surcharge_rates, surcharge_thd);
                let tax = tax_tti + surcharge;
                let cess = tax * cess_rate;
                let row = [
                    taxinc,
                    tax_normal,
                    tax_tti,
                    stcg[i] + ltcg[i],
                    surcharge,
                    cess,
                    tax + cess,
                ];
                for (col, v) in cols.iter_mut().zip(row) {
                    col.push(v);
                }
            }
            Ok(outputs(LIABILITY_OUTPUTS, cols))
        },
    )
}

/// Minimum alternate tax floor and the MAT credit chain
fn mat_liability_and_credit() -> Formula {
    let lags = numbered("MAT_LAG", MAT_SLOTS);
    let new_credits = numbered("NEW_MAT_CR", MAT_SLOTS);
    let mut inputs = vec![
        "TAX_UNDER_SEC115JB_CURR_ASSTYR".to_string(),
        "citax_before_mat".to_string(),
    ];
    inputs.extend(lags.iter().cloned());
    let mut outs = vec!["citax".to_string(), "MAT_CR_CY".to_string(), "MAT_UTIL".to_string()];
    outs.extend(new_credits.iter().cloned());

    Formula::new("MAT_liability_and_credit", inputs, ["MAT_CFLimit"], outs, move |f| {
        let limit = f.count("MAT_CFLimit")?;
        let mat = f.var("TAX_UNDER_SEC115JB_CURR_ASSTYR")?;
        let normal = f.var("citax_before_mat")?;
        let chains = slots(f, &lags)?;

        let n = f.len();
        let (mut citax, mut credit, mut util) =
            (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
        let mut next = Vec::with_capacity(n);
        for (i, chain) in chains.iter().enumerate() {
            let step = ledger::mat_step(normal[i], mat[i], chain, limit);
            citax.push(step.citax);
            credit.push(step.credit);
            util.push(step.utilized());
            next.push(step.next_slots);
        }
        let mut out = vec![
            ("citax".to_string(), citax),
            ("MAT_CR_CY".to_string(), credit),
            ("MAT_UTIL".to_string(), util),
        ];
        out.extend(slot_columns(&new_credits, &next));
        Ok(out)
    })
}

/// Formulas in dependency order
pub fn sequence() -> FormulaSequence {
    let mut formulas: Vec<Formula> = DEPRECIATION_BLOCKS
        .iter()
        .map(|r| depreciation_block(*r))
        .collect();
    formulas.extend([
        total_depreciation(),
        income_business_profession(),
        common::current_year_losses(),
        gti_before_set_off(),
        gti_and_losses(),
        common::itemized_deductions(),
        common::taxable_total_income(),
    ]);
    formulas.extend(common::special_rate_taxes());
    formulas.push(cit_liability());
    formulas.push(mat_liability_and_credit());
    FormulaSequence::new(PopulationKind::Corporate, formulas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calc::Calculator;
    use crate::growth::GrowthFactorTable;
    use crate::parameters::ParameterStore;
    use crate::records::{AdvanceMode, DataTable, FilingPopulation, VariableSchema};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn run(csv: &str) -> Calculator {
        let growth = GrowthFactorTable::default_table().unwrap();
        let policy = ParameterStore::current_law(&growth).unwrap();
        let records = FilingPopulation::from_source(
            Arc::new(VariableSchema::cit_default().unwrap()),
            DataTable::from_reader(csv.as_bytes()).unwrap().into(),
            None,
            2017,
            AdvanceMode::CrossSection { growth: None },
        )
        .unwrap();
        let mut calc = Calculator::new(policy, vec![records]).unwrap();
        calc.calc_all().unwrap();
        calc
    }

    fn get(calc: &Calculator, var: &str) -> Vec<f64> {
        calc.array(PopulationKind::Corporate, var).unwrap()
    }

    #[test]
    fn test_prior_loss_absorbed() {
        let calc = run("ID_NO,INCOME_HP,LOSS_LAG1\n1,1500,1000\n");
        assert_relative_eq!(get(&calc, "GTI_Before_Loss")[0], 1500.0);
        assert_relative_eq!(get(&calc, "GTI")[0], 500.0);
        assert_eq!(get(&calc, "newloss1")[0], 0.0);
        assert_eq!(get(&calc, "newloss2")[0], 0.0);
        assert_relative_eq!(get(&calc, "citax")[0], 500.0 * 0.3 * 1.03, epsilon = 1e-9);
    }

    #[test]
    fn test_depreciation_block() {
        let calc = run("ID_NO,PRFT_GAIN_BP_OTHR_SPECLTV_BUS,PWR_DOWN_VAL_1ST_DAY_PY_15P,\
                        PADDTNS_180_DAYS__MOR_PY_15P,PADDTNS_LESS_180_DAYS_15P\n\
                        1,1000,1000,200,100\n");
        assert_relative_eq!(get(&calc, "dep_amt_pm15")[0], 187.5);
        assert_relative_eq!(get(&calc, "close_wdv_pm15")[0], 1112.5);
        assert_relative_eq!(get(&calc, "dep_amt_pm")[0], 187.5);
        assert_relative_eq!(get(&calc, "Income_BP")[0], 812.5);
    }

    #[test]
    fn test_mat_floor_and_credit() {
        let calc = run("ID_NO,INCOME_HP,TAX_UNDER_SEC115JB_CURR_ASSTYR,MAT_LAG1\n\
                        1,1000,500,0\n\
                        2,1000,0,100\n");
        let normal = 1000.0 * 0.3 * 1.03;
        let before = get(&calc, "citax_before_mat");
        let citax = get(&calc, "citax");
        assert_relative_eq!(before[0], normal, epsilon = 1e-9);
        assert_relative_eq!(citax[0], 500.0);
        assert_relative_eq!(get(&calc, "MAT_CR_CY")[0], 500.0 - normal, epsilon = 1e-9);
        assert_relative_eq!(get(&calc, "NEW_MAT_CR1")[0], 500.0 - normal, epsilon = 1e-9);
        assert_eq!(get(&calc, "MAT_UTIL")[0], 0.0);

        // credit drawn but liability stays at the larger of the two taxes
        assert_relative_eq!(citax[1], normal, epsilon = 1e-9);
        assert_relative_eq!(get(&calc, "MAT_UTIL")[1], 100.0);
        assert_eq!(get(&calc, "NEW_MAT_CR2")[1], 0.0);
        for i in 0..2 {
            assert_relative_eq!(citax[i], before[i].max([500.0, 0.0][i]), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_current_losses_become_fresh_slot() {
        let calc = run("ID_NO,INCOME_HP,CYL_SET_OFF,LOSS_LAG1\n1,100,400,50\n");
        assert_eq!(get(&calc, "GTI")[0], 0.0);
        assert_eq!(get(&calc, "newloss1")[0], 300.0);
        assert_eq!(get(&calc, "newloss2")[0], 50.0);
        assert_eq!(get(&calc, "citax")[0], 0.0);
    }
}
