use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::core::group_monitor::{StaticSystemInfo, SystemInfoSource};
use crate::error::Result;

/// Cache sizes per level in KB, as reported for one core
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheSizes {
    pub l1_kb: u32,
    pub l2_kb: u32,
    pub l3_kb: u32,
}

/// CPU topology from `sysinfo`, caches from CPUID. Virtualization is the
/// firmware setting read through WMI on Windows; elsewhere it is the CPUID
/// VT-x/AMD-V capability, which may still be disabled in firmware.
#[derive(Debug, Default)]
pub struct SysinfoSystemInfoSource;

impl SysinfoSystemInfoSource {
    pub fn new() -> Self {
        Self
    }
}

impl SystemInfoSource for SysinfoSystemInfoSource {
    fn gather(&mut self) -> Result<StaticSystemInfo> {
        let sys = System::new_with_specifics(
            RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing().with_frequency()),
        );

        let cpus = sys.cpus();
        let logical_processors = cpus.len() as u32;
        let physical_cores = System::physical_core_count()
            .map(|n| n as u32)
            .unwrap_or(logical_processors);
        let clock_speed_mhz = cpus.first().map(|cpu| cpu.frequency() as u32).unwrap_or(0);

        let caches = detect_cache_sizes();

        Ok(StaticSystemInfo {
            physical_cores,
            logical_processors,
            clock_speed_mhz,
            l1_cache_kb: caches.l1_kb,
            l2_cache_kb: caches.l2_kb,
            l3_cache_kb: caches.l3_kb,
            virtualization_enabled: virtualization_enabled(),
        })
    }
}

#[cfg(windows)]
fn virtualization_enabled() -> bool {
    super::windows::virtualization_firmware_enabled().unwrap_or_else(|e| {
        log::warn!("{}; falling back to CPUID", e);
        detect_virtualization()
    })
}

#[cfg(not(windows))]
fn virtualization_enabled() -> bool {
    detect_virtualization()
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn detect_cache_sizes() -> CacheSizes {
    use raw_cpuid::{CacheType, CpuId};

    let cpuid = CpuId::new();
    let mut sizes = CacheSizes::default();

    // Deterministic cache parameters (Intel, recent AMD)
    if let Some(params) = cpuid.get_cache_parameters() {
        for cache in params {
            let bytes = cache.associativity()
                * cache.physical_line_partitions()
                * cache.coherency_line_size()
                * cache.sets();
            let kb = (bytes / 1024) as u32;
            match (cache.level(), cache.cache_type()) {
                (1, CacheType::Data) | (1, CacheType::Unified) => sizes.l1_kb = kb,
                (2, _) => sizes.l2_kb = kb,
                (3, _) => sizes.l3_kb = kb,
                _ => {}
            }
        }
    }

    // AMD extended leaves
    if sizes.l1_kb == 0 {
        if let Some(l1) = cpuid.get_l1_cache_and_tlb_info() {
            sizes.l1_kb = l1.dcache_size() as u32;
        }
    }
    if sizes.l2_kb == 0 || sizes.l3_kb == 0 {
        if let Some(l2l3) = cpuid.get_l2_l3_cache_and_tlb_info() {
            if sizes.l2_kb == 0 {
                sizes.l2_kb = l2l3.l2cache_size() as u32;
            }
            if sizes.l3_kb == 0 {
                // Reported in 512 KB units
                sizes.l3_kb = l2l3.l3cache_size() as u32 * 512;
            }
        }
    }

    sizes
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn detect_cache_sizes() -> CacheSizes {
    CacheSizes::default()
}

/// Hardware virtualization extensions (VT-x or AMD-V)
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub fn detect_virtualization() -> bool {
    use raw_cpuid::CpuId;

    let cpuid = CpuId::new();
    let vmx = cpuid
        .get_feature_info()
        .map(|f| f.has_vmx())
        .unwrap_or(false);
    let svm = cpuid
        .get_extended_processor_and_feature_identifiers()
        .map(|f| f.has_svm())
        .unwrap_or(false);
    vmx || svm
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
pub fn detect_virtualization() -> bool {
    false
}
