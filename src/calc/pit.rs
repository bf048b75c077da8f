//! Personal income tax formula sequence

use super::common::{self, outputs, surcharge_band, BP_HEADS, CG_HEADS};
use super::formula::{zip_with, Formula, FormulaSequence, NONE};
use crate::records::PopulationKind;

const LIABILITY_OUTPUTS: [&str; 9] = [
    "Aggregate_Income",
    "tax_Aggregate_Income",
    "rebate_agri",
    "tax_TTI",
    "Total_Tax_Cap_Gains",
    "rebate",
    "surcharge",
    "cess",
    "pitax",
];

/// Tax on `income` under a four-rate slab schedule with three breakpoints
pub fn slab_tax(income: f64, rates: [f64; 4], brk: [f64; 3]) -> f64 {
    rates[0] * income.min(brk[0])
        + rates[1] * (brk[1] - brk[0]).min((income - brk[0]).max(0.0))
        + rates[2] * (brk[2] - brk[1]).min((income - brk[1]).max(0.0))
        + rates[3] * (income - brk[2]).max(0.0)
}

fn income_business_profession() -> Formula {
    Formula::new("income_business_profession", BP_HEADS, NONE, ["Income_BP"], |f| {
        Ok(vec![("Income_BP".to_string(), f.sum(&BP_HEADS)?)])
    })
}

fn gross_total_income() -> Formula {
    let mut inputs = vec!["SALARIES", "INCOME_HP", "Income_BP", "TOTAL_INCOME_OS"];
    inputs.extend(CG_HEADS);
    inputs.extend(["CY_Losses", "BF_Losses"]);
    Formula::new("gross_total_income", inputs, NONE, ["GTI"], |f| {
        let mut heads = vec!["SALARIES", "INCOME_HP", "Income_BP", "TOTAL_INCOME_OS"];
        heads.extend(CG_HEADS);
        let income = f.sum(&heads)?;
        let losses = f.sum(&["CY_Losses", "BF_Losses"])?;
        let gti = zip_with(&income, &losses, |i, l| (i - l).max(0.0));
        Ok(vec![("GTI".to_string(), gti)])
    })
}

fn pit_liability() -> Formula {
    Formula::new(
        "pit_liability",
        [
            "TTI",
            "TI_special_rates",
            "tax_TI_special_rates",
            "Income_Rate_Purpose",
            "AGEGRP",
            "Total_Tax_STCG",
            "Total_Tax_LTCG",
        ],
        [
            "rate1",
            "rate2",
            "rate3",
            "rate4",
            "tbrk1",
            "tbrk2",
            "tbrk3",
            "rebate_rate",
            "rebate_thd",
            "rebate_ceiling",
            "surcharge_rate",
            "surcharge_thd",
            "cess_rate",
        ],
        LIABILITY_OUTPUTS,
        |f| {
            let rates = [
                f.scalar("rate1")?,
                f.scalar("rate2")?,
                f.scalar("rate3")?,
                f.scalar("rate4")?,
            ];
            let age = f.int("AGEGRP")?;
            let brk1 = f.by_bracket("tbrk1", age)?;
            let brk2 = f.by_bracket("tbrk2", age)?;
            let brk3 = f.by_bracket("tbrk3", age)?;
            let rebate_rate = f.scalar("rebate_rate")?;
            let rebate_thd = f.scalar("rebate_thd")?;
            let rebate_ceiling = f.scalar("rebate_ceiling")?;
            let surcharge_rates = f.row("surcharge_rate")?;
            let surcharge_thd = f.row("surcharge_thd")?;
            let cess_rate = f.scalar("cess_rate")?;

            let tti = f.var("TTI")?;
            let special = f.var("TI_special_rates")?;
            let special_tax = f.var("tax_TI_special_rates")?;
            let agri = f.var("Income_Rate_Purpose")?;
            let stcg = f.var("Total_Tax_STCG")?;
            let ltcg = f.var("Total_Tax_LTCG")?;

            let n = f.len();
            let mut cols: [Vec<f64>; 9] = Default::default();
            cols.iter_mut().for_each(|c| c.reserve(n));
            for i in 0..n {
                let brk = [brk1[i], brk2[i], brk3[i]];
                let taxinc = (tti[i] - special[i]).max(0.0);
                let agginc = (taxinc + agri[i]).max(0.0);
                let tax_normal = slab_tax(agginc, rates, brk);
                let mut tax_tti = tax_normal + special_tax[i];

                // agricultural income only sets the rate
                let rebate_agri = if taxinc > brk[0] && agri[i] > 0.0 {
                    slab_tax(agri[i] + brk[0], rates, brk).min(tax_tti)
                } else {
                    0.0
                };
                tax_tti -= rebate_agri;

                let rebate = if tti[i] > rebate_thd {
                    0.0
                } else {
                    (rebate_rate * tti[i]).min(rebate_ceiling).min(tax_tti)
                };
                let mut tax = tax_tti - rebate;
                let surcharge = tax * surcharge_band(tti[i], surcharge_rates, surcharge_thd);
                tax += surcharge;
                let cess = tax * cess_rate;

                let row = [
                    taxinc,
                    tax_normal,
                    rebate_agri,
                    tax_tti,
                    stcg[i] + ltcg[i],
                    rebate,
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

/// Formulas in dependency order
pub fn sequence() -> FormulaSequence {
    let mut formulas = vec![
        income_business_profession(),
        common::current_year_losses(),
        common::passthrough("brought_fwd_losses", "BFL_SET_OFF_BALANCE", "BF_Losses"),
        common::passthrough("agri_income", "NET_AGRC_INCOME", "Income_Rate_Purpose"),
        gross_total_income(),
        common::itemized_deductions(),
        common::passthrough("deduction_10AA", "TOTAL_DEDUC_10AA", "deduction_10AA"),
        common::taxable_total_income(),
    ];
    formulas.extend(common::special_rate_taxes());
    formulas.push(pit_liability());
    FormulaSequence::new(PopulationKind::Individual, formulas)
}
