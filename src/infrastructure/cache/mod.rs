// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 运营商查询结果的两级缓存（内存 + 数据库）
pub mod provider_cache;
