use crate::error::Error;

/// Parse a kernel-style cpulist such as `0`, `0,2` or `1-3,6`.
pub fn parse_cpu_list(list: &str) -> Result<Vec<usize>, Error> {
    let mut cpus = Vec::new();
    for part in list.split(',') {
        let part = part.trim();
        if part.is_empty() {
            return Err(Error::Affinity(format!("empty entry in cpu list '{}'", list)));
        }
        let parse = |s: &str| {
            s.trim()
                .parse::<usize>()
                .map_err(|_| Error::Affinity(format!("invalid cpu '{}' in '{}'", s, list)))
        };
        match part.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse(lo)?, parse(hi)?);
                if lo > hi {
                    return Err(Error::Affinity(format!(
                        "descending cpu range '{}' in '{}'",
                        part, list
                    )));
                }
                cpus.extend(lo..=hi);
            }
            None => cpus.push(parse(part)?),
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

/// Restrict the calling process to `cpus`.
#[cfg(target_os = "linux")]
pub fn set_affinity(cpus: &[usize]) -> Result<(), Error> {
    let max = libc::CPU_SETSIZE as usize;
    if let Some(&cpu) = cpus.iter().find(|&&c| c >= max) {
        return Err(Error::Affinity(format!(
            "cpu {} is beyond the supported maximum of {}",
            cpu,
            max - 1
        )));
    }

    // SAFETY: cpu_set_t is plain bit storage; all-zero is the empty set and
    // every index passed to CPU_SET is below CPU_SETSIZE.
    let ret = unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        for &cpu in cpus {
            libc::CPU_SET(cpu, &mut set);
        }
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set)
    };
    if ret < 0 {
        return Err(Error::Affinity(format!(
            "sched_setaffinity({:?}) failed: {}",
            cpus,
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn set_affinity(cpus: &[usize]) -> Result<(), Error> {
    Err(Error::Affinity(format!(
        "pinning to {:?} is only supported on Linux",
        cpus
    )))
}
