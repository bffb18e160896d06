//! Academic period label lookup.
//!
//! Period labels come from the process notice listing. A notice is searched
//! per configured notice status, in order, and the first notice whose period
//! id matches supplies the label.

use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::fetcher::{FetcherError, FetcherResult, PageSource};
use crate::{Filters, Period};

/// Resolves academic period ids to their labels.
pub struct PeriodLookup<'a, S> {
    source: &'a S,
    endpoint: &'a str,
    page_size: u32,
    statuses: &'a [String],
}

impl<'a, S> PeriodLookup<'a, S>
where
    S: PageSource<Period>,
{
    /// Create a lookup over `endpoint` searching `statuses` in order.
    pub fn new(source: &'a S, endpoint: &'a str, page_size: u32, statuses: &'a [String]) -> Self {
        Self {
            source,
            endpoint,
            page_size,
            statuses,
        }
    }

    /// Find the label of `period_id`, optionally scoped to an organization.
    ///
    /// Fetch failures for one status are logged and end the search with
    /// `Ok(None)`; only cancellation is returned as an error.
    pub async fn label_for(
        &self,
        cancel: &CancelSignal,
        org_id: Option<i64>,
        period_id: i64,
    ) -> FetcherResult<Option<String>> {
        for status in self.statuses {
            let mut filters = Filters::new();
            if let Some(org) = org_id {
                filters.insert("idOrg".to_string(), org.to_string());
            }
            filters.insert("idPeriodoLetivo".to_string(), period_id.to_string());
            filters.insert("statusEdital".to_string(), status.clone());

            let page = match self
                .source
                .fetch_page(cancel, self.endpoint, 0, self.page_size, &filters)
                .await
            {
                Ok(page) => page,
                Err(FetcherError::Cancelled) => return Err(FetcherError::Cancelled),
                Err(e) => {
                    warn!(status = %status, error = %e, "Failed to fetch periods");
                    return Ok(None);
                }
            };

            if page.records.is_empty() {
                debug!(status = %status, period_id, "No periods listed for status");
                continue;
            }

            if let Some(period) = page.records.iter().find(|p| p.period_id == period_id) {
                info!(
                    status = %status,
                    period_id,
                    label = %period.period_label,
                    "Resolved academic period"
                );
                return Ok(Some(period.period_label.clone()));
            }

            debug!(status = %status, period_id, "No matching period for status");
        }

        info!(period_id, "Academic period not found for any notice status");
        Ok(None)
    }
}
