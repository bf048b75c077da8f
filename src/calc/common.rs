//! Formulas shared by the personal and corporate income tax sequences

use super::formula::{add_assign, zip_with, Formula, Frame, Outputs, NONE};
use crate::error::TaxResult;

/// Business and profession income heads
pub const BP_HEADS: [&str; 4] = [
    "PRFT_GAIN_BP_OTHR_SPECLTV_BUS",
    "PRFT_GAIN_BP_SPECLTV_BUS",
    "PRFT_GAIN_BP_SPCFD_BUS",
    "PRFT_GAIN_BP_INC_115BBF",
];

/// Capital gains heads included in gross total income
pub const CG_HEADS: [&str; 5] = [
    "ST_CG_AMT_1",
    "ST_CG_AMT_2",
    "ST_CG_AMT_APPRATE",
    "LT_CG_AMT_1",
    "LT_CG_AMT_2",
];

/// Copy a read variable into a calculated one
pub fn passthrough(name: &str, from: &'static str, to: &'static str) -> Formula {
    Formula::new(name, [from], NONE, [to], move |f| {
        Ok(vec![(to.to_string(), f.var(from)?.to_vec())])
    })
}

pub fn current_year_losses() -> Formula {
    passthrough("current_year_losses", "CYL_SET_OFF", "CY_Losses")
}

pub fn itemized_deductions() -> Formula {
    passthrough("itemized_deductions", "TOTAL_DEDUC_VIA", "deductions")
}

/// TTI = max(0, GTI - deductions)
pub fn taxable_total_income() -> Formula {
    Formula::new("taxable_total_income", ["GTI", "deductions"], NONE, ["TTI"], |f| {
        let tti = zip_with(f.var("GTI")?, f.var("deductions")?, |g, d| (g - d).max(0.0));
        Ok(vec![("TTI".to_string(), tti)])
    })
}

fn two_rate_tax(f: &Frame<'_>, amounts: [&str; 2], rates: [&str; 2]) -> TaxResult<[Vec<f64>; 3]> {
    let r1 = f.scalar(rates[0])?;
    let r2 = f.scalar(rates[1])?;
    let t1: Vec<f64> = f.var(amounts[0])?.iter().map(|a| a * r1).collect();
    let t2: Vec<f64> = f.var(amounts[1])?.iter().map(|a| a * r2).collect();
    let mut total = t1.clone();
    add_assign(&mut total, &t2);
    Ok([t1, t2, total])
}

/// Short- and long-term capital gains taxed at special rates
pub fn special_rate_taxes() -> Vec<Formula> {
    let stcg = Formula::new(
        "tax_stcg_splrate",
        ["ST_CG_AMT_1", "ST_CG_AMT_2"],
        ["ST_CG_RATE1", "ST_CG_RATE2"],
        ["Tax_ST_CG_RATE1", "Tax_ST_CG_RATE2", "Total_Tax_STCG"],
        |f| {
            let [t1, t2, total] =
                two_rate_tax(f, ["ST_CG_AMT_1", "ST_CG_AMT_2"], ["ST_CG_RATE1", "ST_CG_RATE2"])?;
            Ok(vec![
                ("Tax_ST_CG_RATE1".to_string(), t1),
                ("Tax_ST_CG_RATE2".to_string(), t2),
                ("Total_Tax_STCG".to_string(), total),
            ])
        },
    );
    let ltcg = Formula::new(
        "tax_ltcg_splrate",
        ["LT_CG_AMT_1", "LT_CG_AMT_2"],
        ["LT_CG_RATE1", "LT_CG_RATE2"],
        ["Tax_LT_CG_RATE1", "Tax_LT_CG_RATE2", "Total_Tax_LTCG"],
        |f| {
            let [t1, t2, total] =
                two_rate_tax(f, ["LT_CG_AMT_1", "LT_CG_AMT_2"], ["LT_CG_RATE1", "LT_CG_RATE2"])?;
            Ok(vec![
                ("Tax_LT_CG_RATE1".to_string(), t1),
                ("Tax_LT_CG_RATE2".to_string(), t2),
                ("Total_Tax_LTCG".to_string(), total),
            ])
        },
    );
    let totals = Formula::new(
        "tax_specialrates",
        ["ST_CG_AMT_1", "ST_CG_AMT_2", "LT_CG_AMT_1", "LT_CG_AMT_2", "Total_Tax_STCG", "Total_Tax_LTCG"],
        NONE,
        ["TI_special_rates", "tax_TI_special_rates"],
        |f| {
            let income = f.sum(&["ST_CG_AMT_1", "ST_CG_AMT_2", "LT_CG_AMT_1", "LT_CG_AMT_2"])?;
            let tax = f.sum(&["Total_Tax_STCG", "Total_Tax_LTCG"])?;
            Ok(vec![
                ("TI_special_rates".to_string(), income),
                ("tax_TI_special_rates".to_string(), tax),
            ])
        },
    );
    vec![stcg, ltcg, totals]
}

/// Surcharge rate band for each income: below thd1, thd1 to thd2, above
pub fn surcharge_band(income: f64, rates: &[f64], thresholds: &[f64]) -> f64 {
    let rate = |i: usize| rates.get(i).copied().unwrap_or(0.0);
    let thd = |i: usize| thresholds.get(i).copied().unwrap_or(f64::INFINITY);
    if income < thd(0) {
        rate(0)
    } else if income < thd(1) {
        rate(1)
    } else {
        rate(2)
    }
}

/// Named result arrays in declaration order
pub fn outputs<const N: usize>(names: [&str; N], values: [Vec<f64>; N]) -> Outputs {
    names
        .iter()
        .map(|n| n.to_string())
        .zip(values)
        .collect()
}
