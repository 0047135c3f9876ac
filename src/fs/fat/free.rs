//! Free-cluster tracking and chain allocation.

use log::{debug, warn};

use super::table::FREE_CLUSTER;
use super::FatFilesystem;
use crate::device::BlockDevice;
use crate::error::{FatError, Result};

/// Clusters that were free when the volume was mounted, plus those released
/// since. Allocation pops the most recently pushed cluster.
#[derive(Debug, Default)]
pub(crate) struct FreeClusters {
    stack: Vec<u32>,
}

impl FreeClusters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, cluster: u32) {
        self.stack.push(cluster);
    }

    pub(crate) fn pop(&mut self) -> Option<u32> {
        self.stack.pop()
    }

    /// The cluster the next allocation will return.
    pub(crate) fn peek(&self) -> Option<u32> {
        self.stack.last().copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.stack.len()
    }

    #[cfg(test)]
    fn contains(&self, cluster: u32) -> bool {
        self.stack.contains(&cluster)
    }
}

impl<D: BlockDevice> FatFilesystem<D> {
    /// Rebuild the free set from the FAT.
    pub(crate) fn scan_free_clusters(&mut self) -> Result<()> {
        let mut free = FreeClusters::new();
        for cluster in 2..self.bpb.count_of_clusters() {
            if self.get_fat(cluster)? == FREE_CLUSTER {
                free.push(cluster);
            }
        }
        debug!(
            "{} of {} clusters free",
            free.len(),
            self.bpb.count_of_clusters()
        );
        self.free = free;
        Ok(())
    }

    /// Take one cluster out of the free set. The FAT is not touched.
    pub fn alloc_cluster(&mut self) -> Result<u32> {
        match self.free.pop() {
            Some(cluster) => Ok(cluster),
            None => {
                warn!("allocation failed: no free clusters left");
                Err(FatError::NoFreeSpace)
            }
        }
    }

    /// Return a cluster to the free set. The caller marks it FREE in the FAT.
    pub fn release_cluster(&mut self, cluster: u32) {
        self.free.push(cluster);
    }

    /// Allocate a cluster and terminate it as a one-cluster chain.
    pub fn alloc_chain(&mut self) -> Result<u32> {
        let cluster = self.alloc_cluster()?;
        let eoc = self.fat_type.ms_eoc();
        self.set_fat(cluster, eoc)?;
        debug!("allocated cluster {cluster}");
        Ok(cluster)
    }

    /// Append one cluster after `tail` and return it.
    pub fn extend_chain(&mut self, tail: u32) -> Result<u32> {
        let cluster = self.alloc_cluster()?;
        self.set_fat(tail, cluster)?;
        let eoc = self.fat_type.ms_eoc();
        self.set_fat(cluster, eoc)?;
        debug!("extended chain: {tail} -> {cluster}");
        Ok(cluster)
    }

    /// Mark every link of the chain starting at `first` FREE and return the
    /// clusters to the free set. Returns the number of clusters released.
    pub fn free_chain(&mut self, first: u32) -> Result<u32> {
        let mut cluster = first;
        let mut released = 0u32;
        let limit = self.bpb.count_of_clusters();

        while cluster >= 2 && cluster < limit + 2 && released <= limit {
            let next = self.get_fat(cluster)?;
            // already released: the chain looped back on itself
            if next == FREE_CLUSTER {
                break;
            }
            self.set_fat(cluster, FREE_CLUSTER)?;
            self.release_cluster(cluster);
            released += 1;
            if self.fat_type.ends_chain(next) {
                break;
            }
            cluster = next;
        }
        debug!("freed {released} cluster(s) starting at {first}");
        Ok(released)
    }

    /// Last cluster of the chain starting at `first`.
    pub(crate) fn last_cluster(&mut self, first: u32) -> Result<u32> {
        let mut cluster = first;
        for _ in 0..=self.bpb.count_of_clusters() {
            let next = self.get_fat(cluster)?;
            if self.fat_type.ends_chain(next) {
                return Ok(cluster);
            }
            cluster = next;
        }
        Err(FatError::Validation(format!(
            "cluster chain starting at {first} does not terminate"
        )))
    }

    /// Number of free clusters.
    pub fn free_cluster_count(&self) -> u32 {
        self.free.len() as u32
    }
}
