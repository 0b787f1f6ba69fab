use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A cost given either as one total or as named line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CostBreakdown {
    Total(f64),
    Itemized(BTreeMap<String, f64>),
}

impl CostBreakdown {
    pub fn total(&self) -> f64 {
        match self {
            CostBreakdown::Total(amount) => *amount,
            CostBreakdown::Itemized(items) => items.values().sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BreakEvenPoint {
    Units(f64),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        units: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revenue: Option<f64>,
    },
}

impl BreakEvenPoint {
    pub fn units(&self) -> Option<f64> {
        match self {
            BreakEvenPoint::Units(units) => Some(*units),
            BreakEvenPoint::Detailed { units, .. } => *units,
        }
    }

    pub fn revenue(&self) -> Option<f64> {
        match self {
            BreakEvenPoint::Units(_) => None,
            BreakEvenPoint::Detailed { revenue, .. } => *revenue,
        }
    }
}

/// Break-even state accumulated over a conversation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakEvenData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_costs: Option<CostBreakdown>,
    /// Per-unit variable costs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_costs: Option<CostBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_even_point: Option<BreakEvenPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assumptions: Option<Vec<String>>,
}

/// The fields a model reply may set. Anything else is rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BreakEvenUpdate {
    #[serde(default, alias = "fixed_costs")]
    pub fixed_costs: Option<CostBreakdown>,
    #[serde(default, alias = "variable_costs")]
    pub variable_costs: Option<CostBreakdown>,
    #[serde(default, alias = "unit_price")]
    pub unit_price: Option<f64>,
    #[serde(default, alias = "break_even_point")]
    pub break_even_point: Option<BreakEvenPoint>,
    #[serde(default)]
    pub assumptions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ComputedBreakEven {
    pub units: f64,
    pub revenue: f64,
}

impl BreakEvenData {
    pub fn is_empty(&self) -> bool {
        self == &BreakEvenData::default()
    }

    /// Shallow merge: provided fields replace stored ones, the rest stay.
    pub fn merge(&mut self, update: BreakEvenUpdate) {
        if let Some(fixed) = update.fixed_costs {
            self.fixed_costs = Some(fixed);
        }
        if let Some(variable) = update.variable_costs {
            self.variable_costs = Some(variable);
        }
        if let Some(price) = update.unit_price {
            self.unit_price = Some(price);
        }
        if let Some(point) = update.break_even_point {
            self.break_even_point = Some(point);
        }
        if let Some(assumptions) = update.assumptions {
            self.assumptions = Some(assumptions);
        }
    }

    /// Units needed to cover fixed costs, when the inputs allow it.
    pub fn computed_point(&self) -> Option<ComputedBreakEven> {
        let fixed = self.fixed_costs.as_ref()?.total();
        let variable = self
            .variable_costs
            .as_ref()
            .map(CostBreakdown::total)
            .unwrap_or(0.0);
        let price = self.unit_price?;

        let margin = price - variable;
        if margin <= 0.0 || fixed < 0.0 {
            return None;
        }

        let units = (fixed / margin).ceil();
        Some(ComputedBreakEven {
            units,
            revenue: units * price,
        })
    }
}
