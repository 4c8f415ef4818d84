//! Random sequences of operations, checked against the kernel's invariants
//! after every step.
use super::*;
use crate::{CancelReason, Protocol};
use proptest::{collection::vec, num::usize::ANY};

const TASKS: usize = 6;
const SEMS: usize = 4;

#[derive(Debug)]
enum Op {
    Wait { task: usize, sem: usize },
    Trywait { task: usize, sem: usize },
    Post { sem: usize, by_holder: bool },
    Cancel { task: usize },
    Reset { sem: usize, value: u32 },
}

impl Op {
    fn from_seed(i: usize) -> Self {
        let task = (i / 5) % TASKS;
        let sem = (i / (5 * TASKS)) % SEMS;
        match i % 5 {
            0 => Op::Wait { task, sem },
            1 => Op::Trywait { task, sem },
            2 => Op::Post {
                sem,
                by_holder: task % 2 == 0,
            },
            3 => Op::Cancel { task },
            4 => Op::Reset {
                sem,
                value: (task % 3) as u32,
            },
            _ => unreachable!(),
        }
    }
}

proptest::proptest! {
    #[test]
    fn fuzz_semaphores(seeds in vec(ANY, 0..100)) {
        let ops = seeds.into_iter().map(Op::from_seed).collect::<Vec<_>>();

        let _trace = crate::util::test::trace_init_with_default("mycelium_sem=info");
        let _span = tracing::info_span!("fuzz").entered();
        tracing::info!(?ops);
        run_fuzz(ops);
    }
}

fn run_fuzz(ops: Vec<Op>) {
    let kernel = kernel();
    let tasks: Vec<TaskId> = (0..TASKS)
        .map(|i| kernel.task_create(prio(i as u8 * 3)).unwrap())
        .collect();
    let protocols = [
        Protocol::None,
        Protocol::Inherit,
        Protocol::Inherit,
        Protocol::Protect { ceiling: prio(8) },
    ];
    let sems: Vec<SemId> = protocols
        .iter()
        .enumerate()
        .map(|(i, &protocol)| {
            let sem = kernel.sem_init(i as u32 % 2).unwrap();
            kernel.set_protocol(sem, protocol).unwrap();
            sem
        })
        .collect();

    let running = |task: TaskId| kernel.wait_state(task) == Ok(WaitState::Running);

    for op in ops {
        tracing::debug!(?op);
        match op {
            Op::Wait { task, sem } => {
                let (task, idx) = (tasks[task], sem);
                // waiting only on semaphores ordered after everything the task
                // already holds keeps the wait-for graph acyclic.
                let ordered = sems[idx..].iter().all(|&s| kernel.holds(s, task) == 0);
                if running(task) && ordered {
                    let before = kernel.get_value(sems[idx]).unwrap();
                    match kernel.begin_wait(sems[idx], task).unwrap() {
                        Begin::Acquired => assert!(before > 0),
                        Begin::Blocked => assert!(before <= 0),
                    }
                }
            }
            Op::Trywait { task, sem } => {
                let task = tasks[task];
                if running(task) {
                    let before = kernel.get_value(sems[sem]).unwrap();
                    let result = kernel.trywait(sems[sem], task);
                    if before > 0 {
                        assert_eq!(result, Ok(()));
                    } else {
                        assert_eq!(result, Err(Error::WouldBlock));
                        assert_eq!(kernel.get_value(sems[sem]), Ok(before));
                    }
                }
            }
            Op::Post { sem, by_holder } => {
                let sem = sems[sem];
                let poster = if by_holder {
                    tasks
                        .iter()
                        .copied()
                        .find(|&t| running(t) && kernel.holds(sem, t) > 0)
                } else {
                    None
                };
                let before = kernel.get_value(sem).unwrap();
                let waiters = kernel.waiters(sem);
                kernel.post(sem, poster).unwrap();
                assert_eq!(kernel.get_value(sem), Ok(before + 1));

                let woken = kernel.scheduler().take_unblocked();
                if waiters.is_empty() {
                    assert!(woken.is_empty());
                } else {
                    assert_eq!(woken.len(), 1);
                    let granted = woken[0];
                    assert!(waiters.contains(&granted));
                    assert_eq!(kernel.outcome(granted), Some(Ok(())));
                }
            }
            Op::Cancel { task } => {
                let task = tasks[task];
                let waiting = !running(task);
                kernel.notify_wait_interrupted(task, CancelReason::Interrupted);
                let woken = kernel.scheduler().take_unblocked();
                if waiting {
                    assert_eq!(woken, vec![task]);
                    assert_eq!(kernel.outcome(task), Some(Err(Error::Interrupted)));
                } else {
                    assert!(woken.is_empty());
                }
            }
            Op::Reset { sem, value } => {
                let sem = sems[sem];
                let waiters = kernel.waiters(sem);
                kernel.reset(sem, value).unwrap();
                assert_eq!(kernel.get_value(sem), Ok(value as i32));
                assert_eq!(kernel.scheduler().take_unblocked(), waiters);
                for task in waiters {
                    assert_eq!(kernel.outcome(task), Some(Err(Error::Reset)));
                }
            }
        }

        kernel.assert_consistent();
        kernel.scheduler().take_unblocked();
    }
}
