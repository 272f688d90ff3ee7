use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use extract::ChunkStats;
use reconcile::ReconcileReport;

use crate::cache::CacheStats;

#[derive(Debug, Clone, Copy)]
pub enum Stage {
    Read,
    Structure,
    Entities,
}

/// Counters for one `lexstruct` run.
#[derive(Default)]
pub struct Metrics {
    documents: AtomicUsize,
    documents_failed: AtomicUsize,

    chunks: AtomicUsize,
    chunks_ok: AtomicUsize,
    chunks_repaired: AtomicUsize,
    chunks_bisected: AtomicUsize,
    chunks_lost: AtomicUsize,

    entities_kept: AtomicUsize,
    entities_dropped: AtomicUsize,
    entities_synthesized: AtomicUsize,

    // Timing (in microseconds)
    read_time_us: AtomicU64,
    structure_time_us: AtomicU64,
    entities_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_document(&self, success: bool) {
        self.documents.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.documents_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_chunks(&self, stats: &ChunkStats) {
        self.chunks.fetch_add(stats.total, Ordering::Relaxed);
        self.chunks_ok.fetch_add(stats.ok, Ordering::Relaxed);
        self.chunks_repaired.fetch_add(stats.repaired, Ordering::Relaxed);
        self.chunks_bisected.fetch_add(stats.bisected, Ordering::Relaxed);
        self.chunks_lost.fetch_add(stats.lost, Ordering::Relaxed);
    }

    pub fn record_entities(&self, report: &ReconcileReport) {
        self.entities_kept.fetch_add(report.kept, Ordering::Relaxed);
        self.entities_dropped.fetch_add(report.dropped, Ordering::Relaxed);
        self.entities_synthesized.fetch_add(report.synthesized, Ordering::Relaxed);
    }

    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        let total = match stage {
            Stage::Read => &self.read_time_us,
            Stage::Structure => &self.structure_time_us,
            Stage::Entities => &self.entities_time_us,
        };
        total.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self, cache: Option<CacheStats>) -> MetricsSnapshot {
        let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
        let documents = load(&self.documents);

        MetricsSnapshot {
            documents,
            documents_failed: load(&self.documents_failed),
            chunks: load(&self.chunks),
            chunks_ok: load(&self.chunks_ok),
            chunks_repaired: load(&self.chunks_repaired),
            chunks_bisected: load(&self.chunks_bisected),
            chunks_lost: load(&self.chunks_lost),
            entities_kept: load(&self.entities_kept),
            entities_dropped: load(&self.entities_dropped),
            entities_synthesized: load(&self.entities_synthesized),
            cache_hits: cache.map_or(0, |c| c.hits),
            cache_misses: cache.map_or(0, |c| c.misses),
            avg_read_time_ms: avg_time_ms(&self.read_time_us, documents),
            avg_structure_time_ms: avg_time_ms(&self.structure_time_us, documents),
            avg_entities_time_ms: avg_time_ms(&self.entities_time_us, documents),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub documents: usize,
    pub documents_failed: usize,
    pub chunks: usize,
    pub chunks_ok: usize,
    pub chunks_repaired: usize,
    pub chunks_bisected: usize,
    pub chunks_lost: usize,
    pub entities_kept: usize,
    pub entities_dropped: usize,
    pub entities_synthesized: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub avg_read_time_ms: f64,
    pub avg_structure_time_ms: f64,
    pub avg_entities_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_accumulates() {
        let metrics = Metrics::new();
        metrics.record_document(true);
        metrics.record_document(false);
        metrics.record_chunks(&ChunkStats {
            total: 3,
            ok: 2,
            lost: 1,
            ..ChunkStats::default()
        });
        metrics.record_stage(Stage::Structure, Duration::from_millis(40));

        let snapshot = metrics.snapshot(Some(CacheStats {
            entries: 1,
            hits: 4,
            misses: 2,
        }));
        assert_eq!(snapshot.documents, 2);
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!((snapshot.chunks, snapshot.chunks_lost), (3, 1));
        assert_eq!(snapshot.cache_hits, 4);
        assert!((snapshot.avg_structure_time_ms - 20.0).abs() < 1e-9);
        assert_eq!(snapshot.avg_read_time_ms, 0.0);
    }
}
