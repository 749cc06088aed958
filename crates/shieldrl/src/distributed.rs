//! Epoch-boundary reductions across data-parallel workers.
//!
//! Workers each hold a full copy of the parameters and a private buffer;
//! between epochs their statistics and gradients are combined here. No
//! locking is involved anywhere else: synchronization happens only at these
//! barrier-like reduction points.

use crate::utils::mean_std;
use crossbeam_channel::{bounded, Receiver, Sender};
use ndarray::{Array1, ArrayView1};
use std::sync::{Arc, Barrier};

/// Collective operations shared by every worker.
pub trait Collective: Send {
    /// Total number of workers
    fn world_size(&self) -> usize;

    /// This worker's rank (0-indexed)
    fn rank(&self) -> usize;

    /// Whether this worker drives logging/checkpointing
    fn is_root(&self) -> bool {
        self.rank() == 0
    }

    /// Sum a scalar across all workers
    fn sum_scalar(&self, x: f64) -> f64;

    /// Mean and population std of a locally-held array, computed over the
    /// concatenation of every worker's array
    fn stats(&self, xs: &ArrayView1<f32>) -> (f32, f32);

    /// In-place element-wise average across workers
    fn average(&self, v: &mut Array1<f32>);

    /// Overwrite `v` with rank 0's copy
    fn broadcast(&self, v: &mut Array1<f32>);

    /// Barrier synchronization
    fn barrier(&self);
}

/// Single-process collective: every operation is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalCollective;

impl Collective for LocalCollective {
    fn world_size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn sum_scalar(&self, x: f64) -> f64 {
        x
    }

    fn stats(&self, xs: &ArrayView1<f32>) -> (f32, f32) {
        mean_std(xs)
    }

    fn average(&self, _v: &mut Array1<f32>) {}

    fn broadcast(&self, _v: &mut Array1<f32>) {}

    fn barrier(&self) {}
}

/// Channel plumbing shared by the workers of one [`ThreadCollective`] group.
pub struct SyncGroup {
    barrier: Arc<Barrier>,
    // Reduce: each worker sends to root, root answers on the bc channel.
    reduce_senders: Vec<Sender<Vec<f64>>>,
    reduce_receivers: Vec<Receiver<Vec<f64>>>,
    bc_senders: Vec<Sender<Vec<f64>>>,
    bc_receivers: Vec<Receiver<Vec<f64>>>,
}

impl SyncGroup {
    pub fn new(world_size: usize) -> Arc<Self> {
        let mut reduce_senders = Vec::with_capacity(world_size);
        let mut reduce_receivers = Vec::with_capacity(world_size);
        let mut bc_senders = Vec::with_capacity(world_size);
        let mut bc_receivers = Vec::with_capacity(world_size);

        for _ in 0..world_size {
            let (rs, rr) = bounded(1);
            let (bs, br) = bounded(1);
            reduce_senders.push(rs);
            reduce_receivers.push(rr);
            bc_senders.push(bs);
            bc_receivers.push(br);
        }

        Arc::new(Self {
            barrier: Arc::new(Barrier::new(world_size)),
            reduce_senders,
            reduce_receivers,
            bc_senders,
            bc_receivers,
        })
    }
}

/// Thread-backed collective over a shared [`SyncGroup`].
pub struct ThreadCollective {
    rank: usize,
    world_size: usize,
    group: Arc<SyncGroup>,
}

impl ThreadCollective {
    pub fn new(rank: usize, world_size: usize, group: Arc<SyncGroup>) -> Self {
        assert!(rank < world_size);
        Self {
            rank,
            world_size,
            group,
        }
    }

    /// Root gathers one message from every worker, folds them, and sends the
    /// result back; workers send and wait for the answer.
    fn reduce(&self, local: Vec<f64>, fold: impl Fn(Vec<Vec<f64>>) -> Vec<f64>) -> Vec<f64> {
        if self.world_size <= 1 {
            return local;
        }

        if self.rank == 0 {
            let mut parts = Vec::with_capacity(self.world_size);
            parts.push(local);
            for i in 1..self.world_size {
                parts.push(
                    self.group.reduce_receivers[i]
                        .recv()
                        .expect("worker disconnected during reduce"),
                );
            }
            let folded = fold(parts);
            for i in 1..self.world_size {
                self.group.bc_senders[i]
                    .send(folded.clone())
                    .expect("worker disconnected during reduce");
            }
            folded
        } else {
            self.group.reduce_senders[self.rank]
                .send(local)
                .expect("root disconnected during reduce");
            self.group.bc_receivers[self.rank]
                .recv()
                .expect("root disconnected during reduce")
        }
    }
}

impl Collective for ThreadCollective {
    fn world_size(&self) -> usize {
        self.world_size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn sum_scalar(&self, x: f64) -> f64 {
        self.reduce(vec![x], |parts| {
            vec![parts.iter().map(|p| p[0]).sum()]
        })[0]
    }

    fn stats(&self, xs: &ArrayView1<f32>) -> (f32, f32) {
        // Combine (count, sum, sum of squares) so the std is global, not an
        // average of per-worker stds.
        let n = xs.len() as f64;
        let sum: f64 = xs.iter().map(|&v| v as f64).sum();
        let sumsq: f64 = xs.iter().map(|&v| (v as f64).powi(2)).sum();

        let folded = self.reduce(vec![n, sum, sumsq], |parts| {
            let mut acc = [0.0f64; 3];
            for p in parts {
                acc[0] += p[0];
                acc[1] += p[1];
                acc[2] += p[2];
            }
            acc.to_vec()
        });

        let (n, sum, sumsq) = (folded[0], folded[1], folded[2]);
        let mean = sum / n;
        let var = (sumsq / n - mean * mean).max(0.0);
        (mean as f32, var.sqrt() as f32)
    }

    fn average(&self, v: &mut Array1<f32>) {
        if self.world_size <= 1 {
            return;
        }
        let local: Vec<f64> = v.iter().map(|&x| x as f64).collect();
        let ws = self.world_size as f64;
        let folded = self.reduce(local, |parts| {
            let mut acc = vec![0.0f64; parts[0].len()];
            for p in &parts {
                for (a, &x) in acc.iter_mut().zip(p.iter()) {
                    *a += x;
                }
            }
            acc
        });
        for (out, x) in v.iter_mut().zip(folded.iter()) {
            *out = (*x / ws) as f32;
        }
    }

    fn broadcast(&self, v: &mut Array1<f32>) {
        if self.world_size <= 1 {
            return;
        }
        if self.rank == 0 {
            let msg: Vec<f64> = v.iter().map(|&x| x as f64).collect();
            for i in 1..self.world_size {
                self.group.bc_senders[i]
                    .send(msg.clone())
                    .expect("worker disconnected during broadcast");
            }
        } else {
            let msg = self.group.bc_receivers[self.rank]
                .recv()
                .expect("root disconnected during broadcast");
            for (out, x) in v.iter_mut().zip(msg.iter()) {
                *out = *x as f32;
            }
        }
        self.barrier();
    }

    fn barrier(&self) {
        self.group.barrier.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::thread;

    fn run_workers<F>(world_size: usize, f: F) -> Vec<thread::JoinHandle<()>>
    where
        F: Fn(ThreadCollective) + Send + Sync + Clone + 'static,
    {
        let group = SyncGroup::new(world_size);
        (0..world_size)
            .map(|rank| {
                let group = Arc::clone(&group);
                let f = f.clone();
                thread::spawn(move || f(ThreadCollective::new(rank, world_size, group)))
            })
            .collect()
    }

    #[test]
    fn test_local_collective_is_identity() {
        let c = LocalCollective;
        assert_eq!(c.sum_scalar(3.5), 3.5);
        let (mean, std) = c.stats(&array![1.0, 3.0].view());
        assert!((mean - 2.0).abs() < 1e-6);
        assert!((std - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_thread_sum_scalar() {
        for handle in run_workers(3, |c| {
            let total = c.sum_scalar((c.rank() + 1) as f64);
            assert_eq!(total, 6.0);
        }) {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_thread_stats_are_global() {
        // rank 0 holds [0, 2], rank 1 holds [4, 6]: global mean 3,
        // global population std sqrt(5).
        for handle in run_workers(2, |c| {
            let xs = if c.rank() == 0 {
                array![0.0f32, 2.0]
            } else {
                array![4.0f32, 6.0]
            };
            let (mean, std) = c.stats(&xs.view());
            assert!((mean - 3.0).abs() < 1e-5);
            assert!((std - 5.0f32.sqrt()).abs() < 1e-5);
        }) {
            handle.join().unwrap();
        }
    }

    #[test]
    fn test_thread_average_and_broadcast() {
        for handle in run_workers(2, |c| {
            let mut v = if c.rank() == 0 {
                array![2.0f32, 0.0]
            } else {
                array![4.0f32, 2.0]
            };
            c.average(&mut v);
            assert_eq!(v, array![3.0, 1.0]);

            let mut p = if c.rank() == 0 {
                array![7.0f32]
            } else {
                array![0.0f32]
            };
            c.broadcast(&mut p);
            assert_eq!(p, array![7.0]);
        }) {
            handle.join().unwrap();
        }
    }
}
