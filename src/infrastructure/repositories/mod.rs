// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 提供领域仓库接口基于 SeaORM 的具体实现
pub mod business_repo_impl;
pub mod provider_cache_repo_impl;
pub mod retry_queue_repo_impl;
pub mod session_repo_impl;
