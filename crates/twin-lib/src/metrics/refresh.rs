//! Auto-refresh for open chart views
//!
//! A chart view polls the gateway on its own timer and publishes the latest
//! state on a watch channel. Failed refreshes keep the last good data and
//! mark the view stale; they never stop the refresh loop.

use super::{MetricsGateway, Window};
use crate::models::{MetricSeries, MetricType, NodeTimeseries};
use crate::timers::{names, TimerSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::debug;

/// What a chart view displays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "lowercase")]
pub enum ChartRequest {
    Node {
        node: String,
        metric: MetricType,
        window: Window,
    },
    Pod {
        node: String,
        namespace: String,
        pod: String,
        metric: MetricType,
        window: Window,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChartData {
    Node(NodeTimeseries),
    Pod(MetricSeries),
}

/// Display state of a chart view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ChartState {
    Loading,
    Ready { data: ChartData },
    Stale { last: Option<ChartData>, error: String },
}

impl ChartState {
    fn last_data(&self) -> Option<ChartData> {
        match self {
            ChartState::Loading => None,
            ChartState::Ready { data } => Some(data.clone()),
            ChartState::Stale { last, .. } => last.clone(),
        }
    }
}

/// Opens and closes auto-refreshing chart views
pub struct ChartRefresher {
    gateway: Arc<MetricsGateway>,
    timers: Arc<TimerSet>,
}

impl ChartRefresher {
    pub fn new(gateway: Arc<MetricsGateway>, timers: Arc<TimerSet>) -> Self {
        Self { gateway, timers }
    }

    fn timer_name(view: &str) -> String {
        format!("{}{}", names::CHART_PREFIX, view)
    }

    /// Open (or reopen) `view`; any previous refresh loop for the same view
    /// is cancelled before the new one starts.
    pub fn open(
        &self,
        view: &str,
        request: ChartRequest,
        period: Duration,
    ) -> watch::Receiver<ChartState> {
        let (tx, rx) = watch::channel(ChartState::Loading);
        let tx = Arc::new(tx);
        let gateway = self.gateway.clone();
        let request = Arc::new(request);

        self.timers.start(&Self::timer_name(view), period, move || {
            let gateway = gateway.clone();
            let request = request.clone();
            let tx = tx.clone();
            async move {
                let result = match request.as_ref() {
                    ChartRequest::Node {
                        node,
                        metric,
                        window,
                    } => gateway
                        .get_node_timeseries(node, *metric, *window)
                        .await
                        .map(ChartData::Node),
                    ChartRequest::Pod {
                        node,
                        namespace,
                        pod,
                        metric,
                        window,
                    } => gateway
                        .get_pod_timeseries(node, namespace, pod, *metric, *window)
                        .await
                        .map(ChartData::Pod),
                };

                let next = match result {
                    Ok(data) => ChartState::Ready { data },
                    Err(e) => {
                        debug!(error = %e, "Chart refresh failed, keeping last data");
                        ChartState::Stale {
                            last: tx.borrow().last_data(),
                            error: e.to_string(),
                        }
                    }
                };
                let _ = tx.send(next);
            }
        });

        rx
    }

    /// Close `view`, stopping its refresh loop
    pub fn close(&self, view: &str) -> bool {
        self.timers.cancel(&Self::timer_name(view))
    }
}
