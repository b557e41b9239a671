// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库接口模块
///
/// 该模块定义了领域层的仓库接口，具体实现由基础设施层提供。
///
/// 包含的仓库接口：
/// - 会话仓库（session_repository）：抓取会话、检查点与汇总
/// - 商家仓库（business_repository）：抓取结果的分批存储
/// - 运营商缓存仓库（provider_cache_repository）：号码到运营商的持久缓存
/// - 重试队列仓库（retry_queue_repository）：失败操作的持久化重放
pub mod business_repository;
pub mod provider_cache_repository;
pub mod retry_queue_repository;
pub mod session_repository;
