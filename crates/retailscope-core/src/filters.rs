use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::types::{Dataset, DatasetView};

/// Inclusive order-date interval plus the categories to keep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterCriteria {
    start: NaiveDate,
    end: NaiveDate,
    categories: BTreeSet<String>,
}

impl FilterCriteria {
    pub fn new<I, S>(start: NaiveDate, end: NaiveDate, categories: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if start > end {
            return Err(PipelineError::InvalidRequest(format!(
                "date range start {start} is after end {end}"
            )));
        }

        Ok(Self {
            start,
            end,
            categories: categories.into_iter().map(Into::into).collect(),
        })
    }

    /// The full order-date range and every category of the dataset.
    ///
    /// Returns `None` for an empty dataset, which has no date range to select.
    pub fn all(dataset: &Dataset) -> Option<Self> {
        let (start, end) = dataset.order_date_range()?;
        Some(Self {
            start,
            end,
            categories: dataset.categories().iter().cloned().collect(),
        })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn categories(&self) -> &BTreeSet<String> {
        &self.categories
    }

    /// Categories must be ones the dataset actually contains.
    pub fn validate_against(&self, dataset: &Dataset) -> Result<()> {
        let unknown: Vec<&str> = self
            .categories
            .iter()
            .filter(|category| !dataset.categories().contains(*category))
            .map(String::as_str)
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::InvalidRequest(format!(
                "unknown categories: {}",
                unknown.join(", ")
            )))
        }
    }

    pub fn matches(&self, order_day: NaiveDate, category: &str) -> bool {
        self.start <= order_day && order_day <= self.end && self.categories.contains(category)
    }

    /// Narrows both ranges; categories are intersected.
    pub fn intersect(&self, other: &FilterCriteria) -> Option<FilterCriteria> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start > end {
            return None;
        }
        Some(FilterCriteria {
            start,
            end,
            categories: self
                .categories
                .intersection(&other.categories)
                .cloned()
                .collect(),
        })
    }
}

impl Dataset {
    pub fn filter(&self, criteria: &FilterCriteria) -> DatasetView<'_> {
        self.view().filter(criteria)
    }
}

impl<'a> DatasetView<'a> {
    /// Keeps rows whose order date falls in the range and whose category is selected,
    /// preserving source order. The underlying dataset is untouched.
    pub fn filter(&self, criteria: &FilterCriteria) -> DatasetView<'a> {
        let rows = self.dataset().rows();
        let indices = self
            .indices()
            .iter()
            .copied()
            .filter(|&idx| {
                let row = &rows[idx];
                criteria.matches(row.order_day(), &row.category)
            })
            .collect();

        DatasetView::from_indices(self.dataset(), indices)
    }
}
