use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKey {
    ExecutiveSummary,
    CompanyDescription,
    MarketAnalysis,
    Organization,
    ProductsServices,
    MarketingSales,
    FinancialProjections,
}

impl SectionKey {
    /// Catalogue order; also the display order of a plan's sections.
    pub const ALL: [SectionKey; 7] = [
        SectionKey::ExecutiveSummary,
        SectionKey::CompanyDescription,
        SectionKey::MarketAnalysis,
        SectionKey::Organization,
        SectionKey::ProductsServices,
        SectionKey::MarketingSales,
        SectionKey::FinancialProjections,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKey::ExecutiveSummary => "executive_summary",
            SectionKey::CompanyDescription => "company_description",
            SectionKey::MarketAnalysis => "market_analysis",
            SectionKey::Organization => "organization",
            SectionKey::ProductsServices => "products_services",
            SectionKey::MarketingSales => "marketing_sales",
            SectionKey::FinancialProjections => "financial_projections",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }

    pub fn title(&self) -> &'static str {
        match self {
            SectionKey::ExecutiveSummary => "Executive Summary",
            SectionKey::CompanyDescription => "Company Description",
            SectionKey::MarketAnalysis => "Market Analysis",
            SectionKey::Organization => "Organization & Management",
            SectionKey::ProductsServices => "Products & Services",
            SectionKey::MarketingSales => "Marketing & Sales",
            SectionKey::FinancialProjections => "Financial Projections",
        }
    }

    pub fn ordinal(&self) -> i64 {
        Self::ALL
            .iter()
            .position(|key| key == self)
            .map(|i| i as i64)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessPlan {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub sections: Vec<PlanSection>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub id: String,
    pub plan_id: String,
    pub section_key: SectionKey,
    pub title: String,
    pub content: String,
    pub ordinal: i64,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_key_parse() {
        for key in SectionKey::ALL {
            assert_eq!(SectionKey::parse(key.as_str()), Some(key));
        }
        assert_eq!(SectionKey::parse("exit_strategy"), None);
        assert_eq!(SectionKey::parse("Executive_Summary"), None);
    }
}
