use async_trait::async_trait;
use serde_json::Value;
use tabrelay_core::{Strategy, TaskConfig, TaskRequest};
use url::Url;

use crate::error::TaskError;
use crate::runner::TaskRunner;

/// A platform-specific task body. The runner handles storage, progress and
/// reporting; the task only drives the agent.
#[async_trait]
pub trait Task: Send + Sync {
    fn name(&self) -> &'static str;

    /// Strategy reported by `platform_info`; `None` means the configured one.
    fn strategy_override(&self) -> Option<Strategy> {
        None
    }

    async fn run(
        &self,
        runner: &mut TaskRunner,
        query: &str,
        request: &TaskRequest,
    ) -> Result<Vec<Value>, TaskError>;
}

/// Open the platform's start page, type the query into its search box, and
/// iterate the results with the configured strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct SearchTask;

#[async_trait]
impl Task for SearchTask {
    fn name(&self) -> &'static str {
        "search"
    }

    async fn run(
        &self,
        runner: &mut TaskRunner,
        query: &str,
        request: &TaskRequest,
    ) -> Result<Vec<Value>, TaskError> {
        let base_url = runner.config().base_url.clone();
        let input = runner
            .config()
            .selector(TaskConfig::SEARCH_INPUT)
            .ok_or_else(|| TaskError::validation("search needs a search_input selector"))?
            .to_string();
        let strategy = runner.config().iteration().strategy;

        runner.navigate_with_retry(&base_url).await?;
        runner.type_text(&input, query).await?;
        if let Some(submit) = runner.config().selector("submit_button").map(str::to_string) {
            runner.click(&submit).await?;
        }

        let iteration = runner
            .iterate(strategy, &mut |_: &[Value]| {}, request.max_items())
            .await?;
        Ok(iteration.items)
    }
}

/// Follow links from a start page, collecting items from every page visited.
/// The query is used as the start page when it is an absolute http(s) URL;
/// otherwise the crawl starts at the configured base URL.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrawlTask;

impl CrawlTask {
    fn seed(query: &str, base_url: &str) -> String {
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => url.to_string(),
            _ => base_url.to_string(),
        }
    }
}

#[async_trait]
impl Task for CrawlTask {
    fn name(&self) -> &'static str {
        "crawl"
    }

    fn strategy_override(&self) -> Option<Strategy> {
        Some(Strategy::DepthFirst)
    }

    async fn run(
        &self,
        runner: &mut TaskRunner,
        query: &str,
        request: &TaskRequest,
    ) -> Result<Vec<Value>, TaskError> {
        let seed = Self::seed(query, &runner.config().base_url);
        let cap = request
            .max_items()
            .unwrap_or(runner.config().iteration().max_items);
        let iteration = runner
            .crawl_from(&seed, &mut |_: &[Value]| {}, cap)
            .await?;
        Ok(iteration.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crawl_seed_prefers_absolute_query() {
        assert_eq!(
            CrawlTask::seed("https://docs.test/start", "https://base.test/"),
            "https://docs.test/start"
        );
        assert_eq!(
            CrawlTask::seed("rust async", "https://base.test/"),
            "https://base.test/"
        );
        assert_eq!(
            CrawlTask::seed("ftp://files.test/", "https://base.test/"),
            "https://base.test/"
        );
    }
}
