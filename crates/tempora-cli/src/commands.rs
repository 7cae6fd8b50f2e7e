//! Scenario runners behind the CLI subcommands.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use tempora_stm::{RetryPolicy, TransactionManager, record_read, stage_write};
use tempora_timeline::{ConvergenceReport, LoopOptions, OrderedFloat, Runtime, TemporalValue, TemporalVar};
use tempora_types::ordered_f64;
use tracing::info;

use crate::config::TemporaConfig;

/// `x = (x + 1) mod modulus`, converged from `seed`.
pub fn converge(config: &TemporaConfig, modulus: i64, seed: i64, options: LoopOptions) -> Result<String> {
    anyhow::ensure!(modulus > 0, "modulus must be positive, got {modulus}");

    let rt = Runtime::<i64>::with_config(config.convergence.clone());
    let x = rt.get_or_create("x", seed);
    let body_x = x.clone();
    let report = rt
        .run_convergence_loop(
            move |_| {
                body_x.commit(body_x.add(1).rem(modulus)?);
                Ok(())
            },
            options,
        )
        .context("convergence run failed")?;

    Ok(summarize(&report, &x))
}

/// `v = -v`, converged from a floating-point seed.
pub fn negate(config: &TemporaConfig, seed: f64) -> Result<String> {
    let seed = ordered_f64(seed)?;
    let rt = Runtime::<OrderedFloat<f64>>::with_config(config.convergence.clone());
    let v = rt.get_or_create("v", seed);
    let body_v = v.clone();
    let report = rt
        .converge(move |_| {
            body_v.commit(-&body_v);
            Ok(())
        })
        .context("convergence run failed")?;

    Ok(summarize(&report, &v))
}

fn summarize<T: TemporalValue>(report: &ConvergenceReport, var: &TemporalVar<T>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "outcome:      {:?}", report.outcome);
    let _ = writeln!(out, "half-cycles:  {}", report.half_cycles);
    for (name, length) in &report.cycle_lengths {
        let _ = writeln!(out, "cycle:        {name} = {length}");
    }
    let _ = writeln!(out, "final pass:   {}", report.final_iteration_ran);
    let _ = writeln!(out, "{} = {}", var.name(), var.value());
    out
}

/// Parameters for [`transfer`].
#[derive(Clone, Debug)]
pub struct TransferPlan {
    pub workers: usize,
    pub transfers: usize,
    pub initial: i64,
}

/// Concurrent transfers between two accounts.
///
/// Returns the final balances and the telemetry report. The total is
/// checked before returning.
pub async fn transfer(config: &TemporaConfig, plan: TransferPlan) -> Result<String> {
    let rt = Runtime::<i64>::new();
    let from = rt.get_or_create("from", plan.initial);
    let to = rt.get_or_create("to", plan.initial);
    let stm = TransactionManager::with_config(config.stm.clone());
    let policy = config.stm.retry.clone();

    let mut workers = Vec::with_capacity(plan.workers);
    for worker in 0..plan.workers {
        let (stm, policy, from, to) = (stm.clone(), policy.clone(), from.clone(), to.clone());
        let transfers = plan.transfers;
        workers.push(tokio::spawn(async move {
            let mut failed = 0usize;
            for n in 0..transfers {
                let amount = ((worker + n) % 5 + 1) as i64;
                if move_funds(&stm, &policy, &from, &to, amount).await.is_err() {
                    failed += 1;
                }
            }
            failed
        }));
    }

    let mut failed = 0;
    for worker in workers {
        failed += worker.await.context("transfer worker panicked")?;
    }

    let (a, b) = (from.observe()?, to.observe()?);
    anyhow::ensure!(
        a + b == plan.initial * 2,
        "balance invariant broken: {a} + {b} != {}",
        plan.initial * 2
    );
    info!(failed, "transfers finished");

    let mut out = String::new();
    let _ = writeln!(out, "from = {a}");
    let _ = writeln!(out, "to   = {b}");
    let _ = writeln!(out, "failed transfers: {failed}");
    out.push_str(&stm.report());
    Ok(out)
}

async fn move_funds(
    stm: &TransactionManager,
    policy: &RetryPolicy,
    from: &TemporalVar<i64>,
    to: &TemporalVar<i64>,
    amount: i64,
) -> tempora_stm::Result<()> {
    stm.run_async_with_retry(policy, || {
        let (from, to) = (from.clone(), to.clone());
        async move {
            let a = record_read(&from)?.observe()?;
            tokio::task::yield_now().await;
            let b = record_read(&to)?.observe()?;
            stage_write(&from, a - amount)?;
            stage_write(&to, b + amount)?;
            Ok(())
        }
    })
    .await
}
