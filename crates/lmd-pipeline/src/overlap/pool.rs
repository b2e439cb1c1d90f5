//! Concurrent overlap search.
//!
//! Each overlap ID is an independent job: load its hit pairs, cut, fit.
//! Jobs run on a bounded rayon pool and write into one mutex-guarded map
//! that lives only for the duration of the call.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};

use lmd_core::{Mat4, OverlapId};
use log::{info, warn};
use rayon::ThreadPoolBuilder;
use thiserror::Error;

use super::finder::{OverlapError, OverlapMatrix, OverlapMatrixFinder};
use crate::config::{OverlapFinderOptions, PoolOptions};
use crate::provider::CorrespondenceProvider;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build overlap worker pool")]
    Build(#[from] rayon::ThreadPoolBuildError),
}

/// Outcome of searching a set of overlaps: every ID ends up in exactly one
/// of the two maps.
#[derive(Debug, Clone, Default)]
pub struct OverlapScan {
    pub matrices: BTreeMap<OverlapId, OverlapMatrix>,
    pub failures: BTreeMap<OverlapId, OverlapError>,
}

impl OverlapScan {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fitted matrices keyed by ID.
    pub fn transforms(&self) -> BTreeMap<OverlapId, Mat4> {
        self.matrices.iter().map(|(id, m)| (*id, m.matrix)).collect()
    }

    /// All matrices, or the failure with the lowest ID.
    pub fn into_complete(self) -> Result<BTreeMap<OverlapId, OverlapMatrix>, OverlapError> {
        match self.failures.into_values().next() {
            Some(err) => Err(err),
            None => Ok(self.matrices),
        }
    }
}

/// Fit every overlap in `ids`.
///
/// Blocks until each ID has either produced a matrix or a failure; a failing
/// or panicking job does not affect the others. Duplicate IDs are fitted
/// once.
pub fn find_all_overlap_transforms<P>(
    ids: &[OverlapId],
    provider: &P,
    finder_options: &OverlapFinderOptions,
    pool_options: &PoolOptions,
) -> Result<OverlapScan, PoolError>
where
    P: CorrespondenceProvider + ?Sized,
{
    let ids: BTreeSet<OverlapId> = ids.iter().copied().collect();
    let finder = OverlapMatrixFinder::new(finder_options.clone());
    let results: Mutex<HashMap<OverlapId, Result<OverlapMatrix, OverlapError>>> =
        Mutex::new(HashMap::with_capacity(ids.len()));

    let job = |id: OverlapId| {
        let outcome = run_job(&finder, provider, id);
        results
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, outcome);
    };

    if pool_options.sequential {
        info!("searching {} overlaps sequentially", ids.len());
        ids.iter().copied().for_each(&job);
    } else {
        let threads = pool_options.threads.max(1);
        info!("searching {} overlaps on {threads} threads", ids.len());
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("overlap-{i}"))
            .build()?;
        pool.scope(|scope| {
            for &id in &ids {
                let job = &job;
                scope.spawn(move |_| job(id));
            }
        });
    }

    let mut scan = OverlapScan::default();
    for (id, outcome) in results.into_inner().unwrap_or_else(PoisonError::into_inner) {
        match outcome {
            Ok(matrix) => {
                scan.matrices.insert(id, matrix);
            }
            Err(err) => {
                warn!("{err}");
                scan.failures.insert(id, err);
            }
        }
    }

    info!(
        "overlap search finished: {} fitted, {} failed",
        scan.matrices.len(),
        scan.failures.len()
    );
    Ok(scan)
}

fn run_job<P>(
    finder: &OverlapMatrixFinder,
    provider: &P,
    id: OverlapId,
) -> Result<OverlapMatrix, OverlapError>
where
    P: CorrespondenceProvider + ?Sized,
{
    let attempt = panic::catch_unwind(AssertUnwindSafe(|| {
        let pairs = provider
            .hit_pairs(id)
            .map_err(|err| OverlapError::Provider {
                id,
                message: format!("{err:#}"),
            })?;
        finder.find(id, &pairs)
    }));

    attempt.unwrap_or_else(|payload| {
        Err(OverlapError::WorkerFailure {
            id,
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use lmd_core::{
        synthetic::{
            geometry::{MisalignmentRange, SyntheticModule},
            hits::HitOptions,
        },
        HitPairs, ModuleId,
    };

    struct FlakyProvider {
        pairs: BTreeMap<OverlapId, HitPairs>,
        broken: OverlapId,
        panicking: OverlapId,
    }

    impl CorrespondenceProvider for FlakyProvider {
        fn hit_pairs(&self, id: OverlapId) -> Result<HitPairs> {
            if id == self.broken {
                bail!("file truncated");
            }
            if id == self.panicking {
                panic!("decoder crashed on {id}");
            }
            self.pairs.hit_pairs(id)
        }
    }

    fn synthetic_pairs() -> (SyntheticModule, BTreeMap<OverlapId, HitPairs>) {
        let module =
            SyntheticModule::reference(ModuleId::new(1, 0, 2), &MisalignmentRange::default(), 3);
        let pairs = module.all_hit_pairs(&HitOptions {
            count: 400,
            ..HitOptions::default()
        });
        (module, pairs)
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let (module, pairs) = synthetic_pairs();
        let ids: Vec<OverlapId> = module.layout.overlap_ids().collect();
        let finder = OverlapFinderOptions::default();

        let parallel = find_all_overlap_transforms(
            &ids,
            &pairs,
            &finder,
            &PoolOptions {
                threads: 4,
                sequential: false,
            },
        )
        .unwrap();
        let sequential = find_all_overlap_transforms(
            &ids,
            &pairs,
            &finder,
            &PoolOptions {
                threads: 4,
                sequential: true,
            },
        )
        .unwrap();

        assert!(parallel.is_complete());
        assert_eq!(parallel.matrices.len(), 9);
        assert_eq!(parallel.matrices, sequential.matrices);
    }

    #[test]
    fn failures_are_isolated_per_id() {
        let (module, mut pairs) = synthetic_pairs();
        let ids: Vec<OverlapId> = module.layout.overlap_ids().collect();

        let short = ids[0];
        if let Some(p) = pairs.get_mut(&short) {
            p.first.truncate(10);
            p.second.truncate(10);
        }
        let provider = FlakyProvider {
            pairs,
            broken: ids[1],
            panicking: ids[2],
        };

        let scan = find_all_overlap_transforms(
            &ids,
            &provider,
            &OverlapFinderOptions::default(),
            &PoolOptions::default(),
        )
        .unwrap();

        assert_eq!(scan.matrices.len(), 6);
        assert_eq!(scan.failures.len(), 3);
        assert!(matches!(
            scan.failures[&ids[0]],
            OverlapError::InsufficientData { got: 10, .. }
        ));
        assert!(matches!(
            &scan.failures[&ids[1]],
            OverlapError::Provider { message, .. } if message.contains("truncated")
        ));
        assert!(matches!(
            &scan.failures[&ids[2]],
            OverlapError::WorkerFailure { message, .. } if message.contains("decoder crashed")
        ));

        let err = scan.into_complete().unwrap_err();
        assert_eq!(err.id(), ids[0]);
    }

    #[test]
    fn duplicate_ids_are_fitted_once() {
        let (module, pairs) = synthetic_pairs();
        let id = module.layout.overlaps[0].id;
        let scan = find_all_overlap_transforms(
            &[id, id, id],
            &pairs,
            &OverlapFinderOptions::default(),
            &PoolOptions::default(),
        )
        .unwrap();
        assert_eq!(scan.transforms().len(), 1);
    }
}
