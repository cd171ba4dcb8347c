//! Dependency-aware parallel dispatch
//!
//! A package becomes ready once all its dependencies compiled. Ready
//! packages are dispatched in resolved order, at most `max_concurrency` at a
//! time. The first failure is returned and the in-flight futures are dropped,
//! which cancels them; their tasks are logged as failed when dropped.

use super::PackagesCompiler;
use crate::error::{RelprovError, RelprovResult};
use crate::eventlog::Stage;
use crate::release::{PackageId, Release};
use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use tracing::debug;

impl PackagesCompiler {
    pub(super) async fn compile_concurrently(
        &self,
        stage: &Stage,
        release: &Release,
        order: &[PackageId],
    ) -> RelprovResult<()> {
        let mut remaining = vec![0usize; release.package_count()];
        for &id in order {
            remaining[id.index()] = release.dependency_count(id);
        }

        let mut ready: VecDeque<PackageId> = order
            .iter()
            .copied()
            .filter(|id| remaining[id.index()] == 0)
            .collect();
        let mut running = FuturesUnordered::new();
        let mut done = 0;

        while done < order.len() {
            while running.len() < self.options.max_concurrency {
                let Some(id) = ready.pop_front() else {
                    break;
                };
                debug!("Dispatching {}", release.package(id));
                running.push(async move {
                    let result = self.compile_in_stage(stage, release, id).await;
                    (id, result)
                });
            }

            let Some((id, result)) = running.next().await else {
                return Err(RelprovError::Internal(format!(
                    "scheduler stalled with {} packages left",
                    order.len() - done
                )));
            };
            result?;
            done += 1;

            for next in release.dependents(id) {
                remaining[next.index()] -= 1;
                if remaining[next.index()] == 0 {
                    ready.push_back(next);
                }
            }
        }

        Ok(())
    }
}
