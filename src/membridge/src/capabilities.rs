use caps::{CapSet, Capability};

/// Reading or writing another user's memory needs CAP_SYS_PTRACE in the
/// effective set.
pub fn can_trace_others() -> anyhow::Result<bool> {
    Ok(caps::has_cap(
        None,
        CapSet::Effective,
        Capability::CAP_SYS_PTRACE,
    )?)
}

pub fn warn_if_unprivileged() {
    match can_trace_others() {
        Ok(true) => logger::debug!("CAP_SYS_PTRACE is effective"),
        Ok(false) => logger::warn!(
            "CAP_SYS_PTRACE is not effective; only processes ptrace rules already allow are reachable"
        ),
        Err(err) => logger::warn!("failed to query capabilities: {:#}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_set_is_queryable() {
        let effective = caps::read(None, CapSet::Effective).unwrap();
        assert_eq!(
            can_trace_others().unwrap(),
            effective.contains(&Capability::CAP_SYS_PTRACE)
        );
    }
}
