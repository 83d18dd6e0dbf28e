//! Product interaction columns

use crate::data::{Column, Table};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// One resolved product term, e.g. `["season_2", "temp"]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionTerm {
    factors: Vec<String>,
}

impl InteractionTerm {
    pub fn new(factors: Vec<String>) -> Self {
        Self { factors }
    }

    /// Generated column name, factors joined by `_x_`
    pub fn name(&self) -> String {
        self.factors.join("_x_")
    }

    pub fn factors(&self) -> &[String] {
        &self.factors
    }
}

/// Fitted interaction expansion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureInteractions {
    terms: Vec<InteractionTerm>,
}

impl FeatureInteractions {
    /// Expand each group of factor column lists into the products of every combination
    pub fn from_factor_groups(groups: &[Vec<Vec<String>>]) -> Self {
        let mut terms = Vec::new();
        for factors in groups {
            if factors.iter().any(Vec::is_empty) {
                tracing::warn!("Interaction factor matched no columns; term skipped");
                continue;
            }
            let mut combos: Vec<Vec<String>> = vec![Vec::new()];
            for columns in factors {
                combos = combos
                    .into_iter()
                    .flat_map(|prefix| {
                        columns.iter().map(move |c| {
                            let mut next = prefix.clone();
                            next.push(c.clone());
                            next
                        })
                    })
                    .collect();
            }
            terms.extend(combos.into_iter().map(InteractionTerm::new));
        }
        Self { terms }
    }

    pub fn terms(&self) -> &[InteractionTerm] {
        &self.terms
    }

    /// Append the product columns
    pub fn apply(&self, table: &Table) -> Result<Table> {
        let mut result = table.clone();
        for term in &self.terms {
            let factors = term
                .factors
                .iter()
                .map(|f| table.numeric(f))
                .collect::<Result<Vec<_>>>()?;
            let product: Vec<f64> = (0..table.n_rows())
                .map(|i| factors.iter().map(|f| f[i]).product())
                .collect();
            result = result.with_column(Column::numeric(term.name(), product))?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactions_multiply() {
        let table = Table::new(vec![
            Column::numeric("season_2", vec![1.0, 0.0, 1.0]),
            Column::numeric("season_3", vec![0.0, 1.0, 0.0]),
            Column::numeric("temp", vec![0.5, 0.25, 2.0]),
        ])
        .unwrap();

        let interactions = FeatureInteractions::from_factor_groups(&[vec![
            vec!["season_2".to_string(), "season_3".to_string()],
            vec!["temp".to_string()],
        ]]);
        assert_eq!(interactions.terms().len(), 2);

        let out = interactions.apply(&table).unwrap();
        assert_eq!(out.numeric("season_2_x_temp").unwrap(), &[0.5, 0.0, 2.0]);
        assert_eq!(out.numeric("season_3_x_temp").unwrap(), &[0.0, 0.25, 0.0]);
        assert_eq!(out.n_cols(), 5);
    }

    #[test]
    fn test_empty_factor_skips_term() {
        let interactions = FeatureInteractions::from_factor_groups(&[vec![
            vec![],
            vec!["temp".to_string()],
        ]]);
        assert!(interactions.terms().is_empty());
    }
}
