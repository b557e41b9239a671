// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 基础设施层模块
///
/// 该模块包含系统的技术实现细节，基础设施层负责与外部系统的交互，
/// 包括数据库、缓存和页面解析。
///
/// 包含的子模块：
/// - 缓存（cache）：运营商查询结果缓存
/// - 数据库（database）：提供数据库连接和实体映射
/// - 指标（metrics）：Prometheus 指标导出
/// - 解析（parsers）：地图卡片与运营商结果的 HTML 解析
/// - 仓库实现（repositories）：提供领域仓库接口的具体实现
pub mod cache;
pub mod database;
pub mod metrics;
pub mod parsers;
pub mod repositories;
