//! Analytical tool catalog.
//!
//! The registry maps each catalog id to its operation. It is built once at
//! start-up and shared by reference; nothing mutates it afterwards.

pub mod charts;
pub mod statistics;

use crate::dataset::Dataset;
use crate::error::ToolError;
use crate::models::ToolId;
use charts::ChartTarget;
use serde_json::Value;
use std::collections::HashMap;

/// How a tool binds dataset columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Operates over the whole dataset; no column resolution.
    WholeDataset,
    /// Needs one resolved column.
    SingleVariable,
    /// Needs two distinct resolved columns.
    TwoVariable,
}

pub type WholeDatasetOp = fn(&Dataset, &ChartTarget) -> Result<Value, ToolError>;
pub type SingleVariableOp = fn(&Dataset, &str, &ChartTarget) -> Result<Value, ToolError>;
pub type TwoVariableOp = fn(&Dataset, &str, &str, &ChartTarget) -> Result<Value, ToolError>;

/// A tool operation, shaped by the columns it needs.
#[derive(Clone, Copy)]
pub enum Operation {
    WholeDataset(WholeDatasetOp),
    SingleVariable(SingleVariableOp),
    TwoVariable(TwoVariableOp),
}

/// Catalog entry.
#[derive(Clone, Copy)]
pub struct ToolSpec {
    pub id: ToolId,
    pub description: &'static str,
    pub operation: Operation,
    /// Produces a chart artifact rather than a numeric/tabular payload.
    pub produces_artifact: bool,
}

impl ToolSpec {
    pub fn category(&self) -> ToolCategory {
        match self.operation {
            Operation::WholeDataset(_) => ToolCategory::WholeDataset,
            Operation::SingleVariable(_) => ToolCategory::SingleVariable,
            Operation::TwoVariable(_) => ToolCategory::TwoVariable,
        }
    }
}

/// Immutable tool registry.
pub struct ToolRegistry {
    tools: HashMap<ToolId, ToolSpec>,
}

impl ToolRegistry {
    /// The standard catalog.
    pub fn standard() -> Self {
        let specs = [
            ToolSpec {
                id: ToolId::DescriptiveStatistics,
                description: "Counts and percentages for every column",
                operation: Operation::WholeDataset(|ds, _| statistics::descriptive_statistics(ds)),
                produces_artifact: false,
            },
            ToolSpec {
                id: ToolId::CronbachAlpha,
                description: "Cronbach's alpha (raw and standardized) over numerically coded scale items",
                operation: Operation::WholeDataset(|ds, _| {
                    statistics::cronbach_alpha(ds, &ds.numeric_columns())
                }),
                produces_artifact: false,
            },
            ToolSpec {
                id: ToolId::ChiSquareTest,
                description: "Chi-square test of independence between two categorical variables",
                operation: Operation::TwoVariable(|ds, a, b, _| statistics::chi_square_test(ds, a, b)),
                produces_artifact: false,
            },
            ToolSpec {
                id: ToolId::Countplot,
                description: "Bar chart of value counts for one variable",
                operation: Operation::SingleVariable(charts::countplot),
                produces_artifact: true,
            },
            ToolSpec {
                id: ToolId::Piechart,
                description: "Pie chart of value shares for one variable",
                operation: Operation::SingleVariable(charts::piechart),
                produces_artifact: true,
            },
            ToolSpec {
                id: ToolId::Barplot,
                description: "Grouped bar chart of one variable split by another",
                operation: Operation::TwoVariable(charts::barplot),
                produces_artifact: true,
            },
        ];

        Self {
            tools: specs.into_iter().map(|s| (s.id, s)).collect(),
        }
    }

    pub fn get(&self, id: ToolId) -> Option<&ToolSpec> {
        self.tools.get(&id)
    }

    /// Catalog ids in a stable order.
    pub fn ids(&self) -> Vec<ToolId> {
        let mut ids: Vec<ToolId> = self.tools.keys().copied().collect();
        ids.sort();
        ids
    }

    /// One line per tool, for planner prompts.
    pub fn describe(&self) -> String {
        self.ids()
            .into_iter()
            .filter_map(|id| self.get(id))
            .map(|spec| format!("- \"{}\": {}", spec.id, spec.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
