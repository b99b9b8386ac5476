// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of SmartCover.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use bevy_ecs::prelude::Resource;
use std::future::Future;
use tokio::runtime::Handle;

/// Resource that provides access to async task spawning.
///
/// Holds the tokio handle explicitly: ECS systems run on Bevy task-pool threads that
/// have no tokio context of their own, and reqwest needs one.
#[derive(Resource, Clone, Debug)]
pub struct AsyncRuntime {
    handle: Handle,
}

impl AsyncRuntime {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Capture the runtime the caller is running on
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn a detached async task
    pub fn spawn<T>(
        &self,
        future: impl Future<Output = T> + Send + 'static,
    ) -> tokio::task::JoinHandle<T>
    where
        T: Send + 'static,
    {
        self.handle.spawn(future)
    }
}
