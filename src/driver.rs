//! The test loop: receiver creation, runner scheduling, harvesting, and
//! termination.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;

use crate::complexity::Complexity;
use crate::error::TestError;
use crate::generators::{ArgumentsGenerator, GeneratorSetup};
use crate::harness::{Harness, ResolvedSettings, Settings};
use crate::report::{CallRecord, TestResults};
use crate::rng::RecordingRng;
use crate::runner::{OpPicker, ReceiverOpCycle, ReceiverSet, RunContext, TestRunner};
use crate::value::same_instance;

fn created_count(harness: &Harness, runners: &[TestRunner]) -> usize {
    runners
        .iter()
        .filter(|runner| runner.created && (harness.skip_receiver || runner.receiver.is_some()))
        .count()
}

fn to_results(
    harness: &Harness,
    settings: &ResolvedSettings,
    rng: &RecordingRng,
    runners: &mut [TestRunner],
    step_count: usize,
    loop_count: usize,
    completed: bool,
    interrupted: bool,
) -> TestResults {
    let finished_receivers = created_count(harness, runners) >= settings.needed_receivers;
    let untested_receivers = runners.iter().filter(|runner| !runner.tested).count();
    let mut records: Vec<CallRecord> = runners
        .iter_mut()
        .flat_map(|runner| runner.records.drain(..))
        .collect();
    records.sort_by_key(|record| record.step);
    let mut skipped_steps: Vec<usize> = runners
        .iter()
        .flat_map(|runner| runner.skipped.iter().copied())
        .collect();
    skipped_steps.sort_unstable();
    TestResults {
        records,
        subject: harness.subject.clone(),
        seed: rng.seed(),
        completed,
        interrupted,
        finished_receivers,
        untested_receivers,
        skipped_steps,
        step_count,
        loop_count,
        trace: if settings.record_trace {
            Some(rng.trace())
        } else {
            None
        },
    }
}

/// Picks the next ready runner past `floor`, or clears the current one.
fn advance(
    runners: &[TestRunner],
    ctx: &RunContext<'_>,
    floor: &mut usize,
    current: &mut Option<usize>,
) {
    let next = runners
        .iter()
        .enumerate()
        .find(|(index, runner)| *index > *floor && runner.ready(ctx));
    match next {
        Some((index, _)) => {
            *current = Some(index);
            *floor = index;
        }
        None => *current = None,
    }
}

pub(crate) fn run(
    harness: &Harness,
    passed: Settings,
    follow: Option<Vec<u32>>,
    cancel: Option<&AtomicBool>,
) -> Result<TestResults, TestError> {
    let settings = harness.resolve(passed)?;
    let rng = match follow {
        Some(trace) => RecordingRng::following(settings.seed, trace),
        None if settings.record_trace => RecordingRng::recording(settings.seed),
        None => RecordingRng::with_seed(settings.seed),
    };
    tracing::debug!(
        subject = %harness.subject,
        seed = settings.seed,
        tests = settings.test_count,
        receivers = settings.needed_receivers,
        "starting run"
    );

    let pool: Rc<RefCell<Vec<ReceiverSet>>> = Rc::new(RefCell::new(Vec::new()));
    let available: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
    let setup = GeneratorSetup {
        overrides: &harness.overrides,
        receiver_pool: if harness.skip_receiver {
            None
        } else {
            Some(available.clone())
        },
    };
    let mut generators = IndexMap::new();
    for (name, operation) in &harness.operations {
        generators.insert(
            name.clone(),
            RefCell::new(ArgumentsGenerator::new(
                operation,
                &setup,
                settings.caps,
                &rng,
            )?),
        );
    }
    if let Some(initializer) = &harness.initializer {
        generators.insert(
            initializer.name.clone(),
            RefCell::new(ArgumentsGenerator::new(
                initializer,
                &setup,
                settings.caps,
                &rng,
            )?),
        );
    }

    let ctx = RunContext {
        harness,
        settings: &settings,
        rng: &rng,
        pool: pool.clone(),
        generators: &generators,
        cycle: RefCell::new(ReceiverOpCycle::new(harness.receiver_ops.clone())),
    };

    let transition = if harness.faux_static || harness.skip_receiver || settings.method_count == 0
    {
        0.0
    } else {
        1.0 / settings.method_count as f64
    };

    let mut runners: Vec<TestRunner> = Vec::new();
    let mut current: Option<usize> = None;
    let mut floor = 0usize;
    let mut total = 0usize;
    let mut step_count = 0usize;
    let mut loop_count = 0usize;

    while total < settings.test_count {
        loop_count += 1;
        if let Some(cancel) = cancel {
            if cancel.load(Ordering::Relaxed) {
                return Ok(to_results(
                    harness,
                    &settings,
                    &rng,
                    &mut runners,
                    step_count,
                    loop_count,
                    false,
                    true,
                ));
            }
        }
        if let Some(desync) = rng.desync() {
            return Err(desync.into());
        }

        let finished_receivers =
            created_count(harness, &runners) >= settings.needed_receivers;
        let ready_left = runners
            .iter()
            .enumerate()
            .filter(|(index, runner)| *index > floor && runner.ready(&ctx))
            .count();
        let create = current.is_none()
            || (harness.receiver_as_parameter && !finished_receivers)
            || rng.gen_f64() < transition;
        let switch =
            !create && !harness.skip_receiver && ready_left > 0 && rng.gen_f64() < transition;

        let stepped = if create {
            let id = runners.len();
            let mut runner =
                TestRunner::new(id, None, harness.skip_receiver, OpPicker::new(harness));
            if !harness.skip_receiver {
                runner.step(&ctx, step_count)?;
                step_count += 1;
            }
            if runner.ready(&ctx) {
                if let Some(index) = runner.receiver {
                    available.borrow_mut().push(index);
                }
            }
            if runner.ran_last || runner.skipped_last {
                total += 1;
            }
            runners.push(runner);
            if !harness.receiver_as_parameter || current.is_none() {
                current = Some(id);
                floor = id;
            }
            id
        } else {
            if switch {
                advance(&runners, &ctx, &mut floor, &mut current);
            }
            // A non-create step always has a current runner.
            let index = match current {
                Some(index) => index,
                None => continue,
            };
            runners[index].step(&ctx, step_count)?;
            step_count += 1;
            if runners[index].ran_last || runners[index].skipped_last {
                total += 1;
            }
            index
        };

        if runners[stepped].failed() && !settings.run_all {
            let at_minimum = runners[stepped]
                .last_complexity
                .map(|complexity| complexity.level() <= Complexity::MIN)
                .unwrap_or(true);
            if !settings.shrink || at_minimum {
                tracing::debug!(runner = stepped, "stopping on failure");
                return Ok(to_results(
                    harness,
                    &settings,
                    &rng,
                    &mut runners,
                    step_count,
                    loop_count,
                    total >= settings.test_count,
                    false,
                ));
            }
        }

        // Harvest receivers the step returned: aliases of tracked
        // receivers rejoin the generation pool, new ones get runners.
        let harvested: Vec<ReceiverSet> =
            runners[stepped].returned_receivers.drain(..).collect();
        for set in harvested {
            let tracked = {
                let pool = pool.borrow();
                set.reference.as_ref().and_then(|instance| {
                    pool.iter().position(|existing| {
                        matches!(&existing.reference, Some(tracked) if same_instance(tracked, instance))
                    })
                })
            };
            match tracked {
                Some(index) => available.borrow_mut().push(index),
                None => {
                    let id = runners.len();
                    let index = {
                        let mut pool = pool.borrow_mut();
                        pool.push(set);
                        pool.len() - 1
                    };
                    runners.push(TestRunner::new(
                        id,
                        Some(index),
                        false,
                        OpPicker::new(harness),
                    ));
                }
            }
        }

        if let Some(index) = current {
            if !runners[index].ready(&ctx) {
                advance(&runners, &ctx, &mut floor, &mut current);
            }
        }
    }

    if let Some(desync) = rng.desync() {
        return Err(desync.into());
    }
    Ok(to_results(
        harness,
        &settings,
        &rng,
        &mut runners,
        step_count,
        loop_count,
        true,
        false,
    ))
}
