// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// HTML 解析模块
///
/// 地图列表卡片和运营商查询结果的解析
pub mod carrier_parser;
pub mod listing_parser;
