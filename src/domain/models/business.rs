// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 无法解析运营商时使用的取值
pub const UNKNOWN_PROVIDER: &str = "Unknown";

/// 从地图列表抓取到的商家
///
/// `name` 一定非空；`provider` 在查询前为空字符串
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedBusiness {
    /// 地图详情页地址
    pub maps_url: String,
    /// 商家名称
    pub name: String,
    /// 原始电话号码
    pub phone: Option<String>,
    /// 运营商
    #[serde(default)]
    pub provider: String,
    /// 地址
    pub address: Option<String>,
    /// 所在城镇
    pub town: String,
    /// 所属行业
    pub industry: String,
}

impl ScrapedBusiness {
    /// 是否有可查询的电话号码
    pub fn has_phone(&self) -> bool {
        self.phone.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}
