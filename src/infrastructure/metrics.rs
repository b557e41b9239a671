// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const TOWNS_TOTAL: &str = "scraper_towns_total";
pub const BUSINESSES_TOTAL: &str = "scraper_businesses_total";
pub const PROVIDER_LOOKUPS_TOTAL: &str = "provider_lookups_total";
pub const PROVIDER_LOOKUP_BROWSERS_TOTAL: &str = "provider_lookup_browsers_total";
pub const RETRY_QUEUE_ITEMS_TOTAL: &str = "retry_queue_items_total";
pub const SESSIONS_ACTIVE: &str = "scrape_sessions_active";

/// 安装 Prometheus 导出器
///
/// 地址无效或端口被占用时只记录警告，不影响主流程
pub fn init_metrics(listen_addr: &str) {
    let addr: SocketAddr = match listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!("Invalid metrics address {}: {}", listen_addr, e);
            return;
        }
    };

    // Ignore error if address is already in use (for development/testing)
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    describe();
    info!("Metrics exporter listening on {}", addr);
}

fn describe() {
    metrics::describe_counter!(TOWNS_TOTAL, "Towns processed, labelled by outcome");
    metrics::describe_counter!(BUSINESSES_TOTAL, "Business listings scraped");
    metrics::describe_counter!(PROVIDER_LOOKUPS_TOTAL, "Carrier lookups, labelled by outcome");
    metrics::describe_counter!(PROVIDER_LOOKUP_BROWSERS_TOTAL, "Browsers launched for carrier lookups");
    metrics::describe_counter!(RETRY_QUEUE_ITEMS_TOTAL, "Retry queue items processed, labelled by outcome");
    metrics::describe_gauge!(SESSIONS_ACTIVE, "Scrape sessions currently registered");
}
