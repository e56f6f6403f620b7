use colored::Colorize;

use crate::core::group_monitor::{timestamp_format, MetricToggles, Sample, StaticSystemInfo};

/// Plain summary of one sample, only the enabled metric families
pub fn format_sample_line(sample: &Sample, toggles: &MetricToggles) -> String {
    let mut parts = vec![format!(
        "{}  {} x{}",
        sample.timestamp.format(timestamp_format::FORMAT),
        sample.process_name,
        sample.group_size
    )];

    if toggles.cpu {
        parts.push(format!("CPU {:>6.2}%", sample.cpu_usage));
    }
    if toggles.memory {
        parts.push(format!(
            "Mem {:>8.1} MB (private {:.1} MB)  Threads {}",
            sample.memory_usage, sample.private_memory_usage, sample.thread_count
        ));
    }
    if toggles.disk {
        parts.push(format!("Disk {:.2} MB/s", sample.disk_io));
    }
    if toggles.network {
        parts.push(format!("Net {:.0}", sample.network_usage));
    }
    if toggles.gpu {
        parts.push(format!(
            "GPU {:.0}% {:.0}°C {:.0} MHz {:.0} MB",
            sample.gpu_usage_percent,
            sample.gpu_temp_c,
            sample.gpu_clock_mhz,
            sample.gpu_memory_mb
        ));
    }
    parts.push(format!("Procs {}", sample.process_count));

    parts.join("  |  ")
}

/// CPU load colored by severity
pub fn colorize_cpu(cpu_usage: f32) -> String {
    let text = format!("{:.2}%", cpu_usage);
    if cpu_usage >= 80.0 {
        text.red().bold().to_string()
    } else if cpu_usage >= 50.0 {
        text.yellow().to_string()
    } else {
        text.green().to_string()
    }
}

/// Multi-line block of the static machine facts
pub fn format_static_info(info: &StaticSystemInfo) -> String {
    format!(
        "Cores: {} physical / {} logical  |  Clock: {} MHz\n\
         Cache: L1 {} KB, L2 {} KB, L3 {} KB  |  Virtualization: {}",
        info.physical_cores,
        info.logical_processors,
        info.clock_speed_mhz,
        info.l1_cache_kb,
        info.l2_cache_kb,
        info.l3_cache_kb,
        info.virtualization_status()
    )
}
