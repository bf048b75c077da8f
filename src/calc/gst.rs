//! Consumption tax formula sequence

use super::common::outputs;
use super::formula::{scale, Formula, FormulaSequence, NONE};
use crate::records::PopulationKind;

/// Consumption categories, each with its own rate parameter
pub const ITEMS: [&str; 7] = [
    "cereal",
    "pulses",
    "milk",
    "edible_oil",
    "fuel",
    "clothing",
    "other",
];

fn consumption_var(item: &str) -> String {
    format!("CONS_{}", item.to_uppercase())
}

fn item_tax(item: &'static str) -> Formula {
    let cons = consumption_var(item);
    let rate = format!("gst_rate_{}", item);
    let out = format!("gst_{}", item);
    Formula::new(
        &format!("gst_{}", item),
        [cons.clone()],
        [rate.clone()],
        [out.clone()],
        move |f| Ok(vec![(out.clone(), scale(f.var(&cons)?, f.scalar(&rate)?))]),
    )
}

fn totals() -> Formula {
    let cons: Vec<String> = ITEMS.iter().map(|i| consumption_var(i)).collect();
    let taxes: Vec<String> = ITEMS.iter().map(|i| format!("gst_{}", i)).collect();
    let inputs: Vec<String> = cons.iter().chain(&taxes).cloned().collect();
    Formula::new("gst_totals", inputs, NONE, ["total_consumption", "gst"], move |f| {
        let cons: Vec<&str> = cons.iter().map(|s| s.as_str()).collect();
        let taxes: Vec<&str> = taxes.iter().map(|s| s.as_str()).collect();
        Ok(outputs(["total_consumption", "gst"], [f.sum(&cons)?, f.sum(&taxes)?]))
    })
}

/// Formulas in dependency order
pub fn sequence() -> FormulaSequence {
    let mut formulas: Vec<Formula> = ITEMS.iter().map(|i| item_tax(*i)).collect();
    formulas.push(totals());
    FormulaSequence::new(PopulationKind::Consumption, formulas)
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

    #[test]
    fn test_item_rates_and_totals() {
        let growth = GrowthFactorTable::default_table().unwrap();
        let policy = ParameterStore::current_law(&growth).unwrap();
        let csv = "ID_NO,CONS_CEREAL,CONS_FUEL,CONS_CLOTHING\n1,1000,200,100\n2,0,0,0\n";
        let records = FilingPopulation::from_source(
            Arc::new(VariableSchema::gst_default().unwrap()),
            DataTable::from_reader(csv.as_bytes()).unwrap().into(),
            None,
            2017,
            AdvanceMode::CrossSection { growth: None },
        )
        .unwrap();
        let mut calc = Calculator::new(policy, vec![records]).unwrap();
        calc.calc_all().unwrap();

        let get = |v: &str| calc.array(PopulationKind::Consumption, v).unwrap();
        assert_eq!(get("gst_cereal"), vec![0.0, 0.0]);
        assert_relative_eq!(get("gst_fuel")[0], 36.0, epsilon = 1e-9);
        assert_relative_eq!(get("gst_clothing")[0], 5.0, epsilon = 1e-9);
        assert_eq!(get("total_consumption"), vec![1300.0, 0.0]);
        assert_relative_eq!(get("gst")[0], 41.0, epsilon = 1e-9);
    }
}
