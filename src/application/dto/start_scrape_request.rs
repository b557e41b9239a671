// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::config::settings::ScraperSettings;
use crate::domain::models::session::ConcurrencySettings;

/// 开始抓取请求
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartScrapeRequestDto {
    #[validate(length(min = 1, max = 500), custom(function = "validate_names"))]
    pub towns: Vec<String>,
    #[validate(length(min = 1, max = 100), custom(function = "validate_names"))]
    pub industries: Vec<String>,
    #[validate(nested)]
    pub concurrency: Option<ConcurrencyDto>,
}

/// 并发配置，缺省的字段使用配置文件中的默认值
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConcurrencyDto {
    #[validate(range(min = 1, max = 10))]
    pub simultaneous_towns: Option<u32>,
    #[validate(range(min = 1, max = 10))]
    pub simultaneous_industries: Option<u32>,
    #[validate(range(min = 1, max = 10))]
    pub simultaneous_lookups: Option<u32>,
}

impl StartScrapeRequestDto {
    pub fn new(towns: Vec<String>, industries: Vec<String>) -> Self {
        Self {
            towns,
            industries,
            concurrency: None,
        }
    }

    /// 去掉首尾空白后的城镇
    pub fn clean_towns(&self) -> Vec<String> {
        clean(&self.towns)
    }

    pub fn clean_industries(&self) -> Vec<String> {
        clean(&self.industries)
    }

    /// 合并默认值后的并发配置
    pub fn concurrency(&self, defaults: &ScraperSettings) -> ConcurrencySettings {
        let requested = self.concurrency.clone().unwrap_or_default();
        ConcurrencySettings::new(
            requested
                .simultaneous_towns
                .unwrap_or(defaults.default_simultaneous_towns),
            requested
                .simultaneous_industries
                .unwrap_or(defaults.default_simultaneous_industries),
            requested
                .simultaneous_lookups
                .unwrap_or(defaults.default_simultaneous_lookups),
        )
        .normalized()
    }
}

fn clean(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.trim().to_string()).collect()
}

fn validate_names(values: &[String]) -> Result<(), ValidationError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        return Err(ValidationError::new("blank_name"));
    }
    Ok(())
}
