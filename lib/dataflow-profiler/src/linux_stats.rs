//! Reads this process's CPU/RSS/network figures straight out of `/proc`,
//! backing the `LinuxProcStats` profile event class (§6). Linux-only by
//! design: the class exists to surface whatever `/proc` already tracks for
//! free, not to build a portable OS-stats abstraction.

use std::time::Instant;

/// `sysconf(_SC_CLK_TCK)` on every Linux target this runtime ships on.
/// Reading the real value would mean an `nix`/libc dependency for one
/// constant that hasn't moved off 100 since the 2.6 kernel series.
const CLOCK_TICKS_PER_SEC: f64 = 100.0;

fn read_self_stat_ticks() -> Option<(u64, u64)> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // The command name field is parenthesized and may itself contain
    // spaces or parens, so split on the *last* ')' rather than splitting
    // on whitespace from the start.
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // Field 3 (process state) is fields[0] here; utime is field 14, so
    // index 14 - 3 = 11, and stime is index 12.
    let utime = fields.get(11)?.parse().ok()?;
    let stime = fields.get(12)?.parse().ok()?;
    Some((utime, stime))
}

fn read_self_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().split_whitespace().next()?.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/// Sums rx/tx bytes across every interface except loopback, matching what
/// `ifconfig`/`ip -s link` report per-interface from the same file.
fn read_net_dev_totals() -> Option<(u64, u64)> {
    let contents = std::fs::read_to_string("/proc/net/dev").ok()?;
    let mut rx_total = 0u64;
    let mut tx_total = 0u64;
    for line in contents.lines().skip(2) {
        let (iface, rest) = line.split_once(':')?;
        if iface.trim() == "lo" {
            continue;
        }
        let fields: Vec<&str> = rest.split_whitespace().collect();
        let rx_bytes: u64 = fields.first()?.parse().ok()?;
        let tx_bytes: u64 = fields.get(8)?.parse().ok()?;
        rx_total += rx_bytes;
        tx_total += tx_bytes;
    }
    Some((tx_total, rx_total))
}

fn read_diskstats() -> String {
    std::fs::read_to_string("/proc/diskstats").unwrap_or_default()
}

/// One reading of the figures the `LinuxProcStats` event reports.
pub struct LinuxProcSample {
    pub cpu_user: f64,
    pub cpu_sys: f64,
    pub pr_rss: u64,
    pub net_tx_speed: f64,
    pub net_rx_speed: f64,
    pub diskstats: String,
}

/// Tracks the deltas a single `/proc` reading can't give on its own: CPU
/// ticks and network byte counters are both cumulative since boot, so
/// turning them into "this sampling window" figures needs the previous
/// reading kept around.
pub struct LinuxProcSampler {
    last_sample: Instant,
    last_utime: u64,
    last_stime: u64,
    last_net: (u64, u64),
}

impl LinuxProcSampler {
    pub fn new() -> Self {
        let (utime, stime) = read_self_stat_ticks().unwrap_or((0, 0));
        Self {
            last_sample: Instant::now(),
            last_utime: utime,
            last_stime: stime,
            last_net: read_net_dev_totals().unwrap_or((0, 0)),
        }
    }

    /// Returns `None` on non-Linux hosts or if `/proc/self/stat` is
    /// unreadable (e.g. inside a sandbox without `/proc`).
    pub fn sample(&mut self) -> Option<LinuxProcSample> {
        let (utime, stime) = read_self_stat_ticks()?;
        let pr_rss = read_self_rss_bytes().unwrap_or(0);
        let (tx_total, rx_total) = read_net_dev_totals().unwrap_or(self.last_net);
        let diskstats = read_diskstats();

        let elapsed = self.last_sample.elapsed().as_secs_f64();
        let (cpu_user, cpu_sys, net_tx_speed, net_rx_speed) = if elapsed > 0.0 {
            (
                utime.saturating_sub(self.last_utime) as f64 / CLOCK_TICKS_PER_SEC / elapsed,
                stime.saturating_sub(self.last_stime) as f64 / CLOCK_TICKS_PER_SEC / elapsed,
                tx_total.saturating_sub(self.last_net.0) as f64 / elapsed,
                rx_total.saturating_sub(self.last_net.1) as f64 / elapsed,
            )
        } else {
            (0.0, 0.0, 0.0, 0.0)
        };

        self.last_sample = Instant::now();
        self.last_utime = utime;
        self.last_stime = stime;
        self.last_net = (tx_total, rx_total);

        Some(LinuxProcSample {
            cpu_user,
            cpu_sys,
            pr_rss,
            net_tx_speed,
            net_rx_speed,
            diskstats,
        })
    }
}

impl Default for LinuxProcSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_a_sample_from_the_real_proc_filesystem() {
        // Only meaningful on Linux; on any other target /proc/self/stat is
        // simply absent and sample() returns None, which is itself correct
        // behavior rather than a failure.
        let mut sampler = LinuxProcSampler::new();
        if let Some(sample) = sampler.sample() {
            assert!(sample.cpu_user >= 0.0);
            assert!(sample.cpu_sys >= 0.0);
        }
    }
}
