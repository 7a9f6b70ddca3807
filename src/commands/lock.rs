//! Implementation of the `replset-agent lock` commands.

use super::Services;
use crate::cli::LockClearArgs;
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::locks::{LockHeader, LockInfo, LockStore, OperationType};

pub fn cmd_lock_list(config: &Config) -> Result<()> {
    let services = Services::new(config);
    let locks = services.locks.list()?;

    if locks.is_empty() {
        println!("No locks held.");
        return Ok(());
    }

    println!("Locks ({}):", locks.len());
    println!();

    for lock in &locks {
        let header = &lock.metadata.header;
        println!("  {}:", header);
        println!("    Node:       {}", header.node);
        println!("    Owner:      {}", lock.metadata.owner);
        if let Some(pid) = lock.metadata.pid {
            println!("    PID:        {}", pid);
        }
        println!(
            "    Created:    {}",
            lock.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Heartbeat:  {} ago", lock.metadata.heartbeat_age_string());
        if lock.is_stale {
            println!(
                "    Status:     STALE (no heartbeat for over {}s)",
                config.locks.stale_secs
            );
        }
        println!("    Path:       {}", lock.path.display());
        println!();
    }

    let stale_count = locks.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "{} stale lock(s) found. Use `replset-agent lock clear <TYPE> [NAME]` to clear.",
            stale_count
        );
    }

    Ok(())
}

pub fn cmd_lock_clear(config: &Config, args: LockClearArgs) -> Result<()> {
    let replset = args.replset.as_deref().unwrap_or(&config.node.replset);
    let me = &config.node.me;

    let header = match (args.op, args.name.as_deref()) {
        (OperationType::Pitr, _) => LockHeader::pitr(replset, me),
        (OperationType::Backup, Some(name)) => LockHeader::backup(replset, me, name),
        (OperationType::Restore, Some(name)) => LockHeader::restore(replset, me, name),
        (op, None) => {
            return Err(AgentError::Config(format!(
                "a {} lock is named: use `replset-agent lock clear {} <NAME>`",
                op, op
            )));
        }
    };

    let services = Services::new(config);
    let Some(existing) = find_lock(services.locks.as_ref(), &header)? else {
        println!("No lock found for {}.", header);
        return Ok(());
    };

    services.locks.mark_stale(&header)?;
    services.log.warning(
        header.op,
        &header.name,
        format_args!(
            "lock cleared manually, was held by {}",
            existing.metadata.header.node
        ),
    );

    println!("Cleared lock: {}", existing);
    Ok(())
}

fn find_lock(store: &dyn LockStore, header: &LockHeader) -> Result<Option<LockInfo>> {
    Ok(store
        .list()?
        .into_iter()
        .find(|info| info.metadata.header.same_lock(header)))
}
