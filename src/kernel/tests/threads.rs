//! Scenarios in which every task is an OS thread.
use super::*;
use crate::{loom::thread, CancelReason, Protocol};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

type ThreadKernel = Arc<Kernel<ThreadScheduler>>;

fn thread_kernel() -> ThreadKernel {
    Arc::new(Kernel::new(ThreadScheduler::default()))
}

/// Spawns a thread running as `task`.
fn spawn_task<T: Send + 'static>(
    kernel: &ThreadKernel,
    task: TaskId,
    f: impl FnOnce(&Kernel<ThreadScheduler>, TaskId) -> T + Send + 'static,
) -> std::thread::JoinHandle<T> {
    let kernel = kernel.clone();
    thread::spawn(move || {
        kernel.scheduler().register(task);
        let _span = tracing::info_span!("task", %task).entered();
        f(&kernel, task)
    })
}

#[track_caller]
fn wait_until(mut cond: impl FnMut() -> bool) {
    while !cond() {
        thread::yield_now();
    }
}

#[test]
fn wait_then_post() {
    let _trace = crate::util::test::trace_init();
    let kernel = thread_kernel();
    let task = kernel.task_create(prio(5)).unwrap();
    let sem = kernel.sem_init(0).unwrap();

    let waiter = spawn_task(&kernel, task, move |kernel, task| kernel.wait(sem, task));
    wait_until(|| kernel.get_value(sem) == Ok(-1));

    kernel.post(sem, None).unwrap();
    assert_eq!(waiter.join().unwrap(), Ok(()));
    assert_eq!(kernel.get_value(sem), Ok(0));
    kernel.assert_consistent();
}

#[test]
fn tickwait_times_out() {
    let _trace = crate::util::test::trace_init();
    let kernel = thread_kernel();
    let timer = Arc::new(ManualTimer::starting_at(0));
    let task = kernel.task_create(prio(5)).unwrap();
    let sem = kernel.sem_init(0).unwrap();

    let waiter = spawn_task(&kernel, task, {
        let timer = timer.clone();
        move |kernel, task| kernel.tickwait(sem, task, &*timer, 0, 10)
    });
    wait_until(|| timer.deadline(task).is_some());

    assert_eq!(timer.advance(10, &*kernel), vec![task]);
    assert_eq!(waiter.join().unwrap(), Err(Error::TimedOut));
    assert_eq!(kernel.get_value(sem), Ok(0));
    assert_eq!(timer.deadline(task), None);
    kernel.assert_consistent();
}

#[test]
fn signal_cancels_tickwait() {
    let _trace = crate::util::test::trace_init();
    let kernel = thread_kernel();
    let timer = Arc::new(ManualTimer::starting_at(0));
    let task = kernel.task_create(prio(5)).unwrap();
    let sem = kernel.sem_init(0).unwrap();

    let waiter = spawn_task(&kernel, task, {
        let timer = timer.clone();
        move |kernel, task| kernel.tickwait(sem, task, &*timer, 0, 10)
    });
    wait_until(|| timer.deadline(task).is_some());

    kernel.notify_wait_interrupted(task, CancelReason::Interrupted);
    assert_eq!(waiter.join().unwrap(), Err(Error::Interrupted));
    assert_eq!(kernel.get_value(sem), Ok(0));
    assert_eq!(timer.deadline(task), None);
    kernel.assert_consistent();
}

#[test]
fn reset_wakes_blocked_threads() {
    let _trace = crate::util::test::trace_init();
    let kernel = thread_kernel();
    let sem = kernel.sem_init(0).unwrap();

    let waiters: Vec<_> = (0..2)
        .map(|_| {
            let task = kernel.task_create(prio(5)).unwrap();
            spawn_task(&kernel, task, move |kernel, task| kernel.wait(sem, task))
        })
        .collect();
    wait_until(|| kernel.get_value(sem) == Ok(-2));

    kernel.reset(sem, 3).unwrap();
    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), Err(Error::Reset));
    }
    assert_eq!(kernel.get_value(sem), Ok(3));
    kernel.assert_consistent();
}

#[test]
fn mutual_exclusion_with_inheritance() {
    const TASKS: u8 = 4;
    const ITERS: usize = 100;

    let _trace = crate::util::test::trace_init_with_default("mycelium_sem=info");
    let kernel = thread_kernel();
    let sem = kernel.sem_init(1).unwrap();
    kernel.set_protocol(sem, Protocol::Inherit).unwrap();
    let inside = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..TASKS)
        .map(|i| {
            let task = kernel.task_create(prio(i * 10)).unwrap();
            let inside = inside.clone();
            let handle = spawn_task(&kernel, task, move |kernel, task| {
                for _ in 0..ITERS {
                    kernel.wait(sem, task).unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    thread::yield_now();
                    assert_eq!(inside.fetch_sub(1, Ordering::SeqCst), 1);
                    kernel.post(sem, Some(task)).unwrap();
                }
            });
            (task, handle)
        })
        .collect();

    for (task, handle) in tasks {
        handle.join().unwrap();
        assert_eq!(kernel.effective_priority(task), kernel.base_priority(task));
    }
    assert_eq!(kernel.get_value(sem), Ok(1));
    assert_eq!(kernel.holder_count(sem), 0);
    kernel.assert_consistent();
}

#[test]
fn signal_races_with_post() {
    let _trace = crate::util::test::trace_init();
    for _ in 0..50 {
        let kernel = thread_kernel();
        let task = kernel.task_create(prio(5)).unwrap();
        let sem = kernel.sem_init(0).unwrap();

        let waiter = spawn_task(&kernel, task, move |kernel, task| kernel.wait(sem, task));
        wait_until(|| kernel.get_value(sem) == Ok(-1));

        let signal = thread::spawn({
            let kernel = kernel.clone();
            move || kernel.notify_wait_interrupted(task, CancelReason::Interrupted)
        });
        kernel.post(sem, None).unwrap();
        signal.join().unwrap();

        // exactly one of the two ended the wait, and the count agrees.
        match waiter.join().unwrap() {
            Ok(()) => assert_eq!(kernel.get_value(sem), Ok(0)),
            Err(Error::Interrupted) => assert_eq!(kernel.get_value(sem), Ok(1)),
            Err(error) => panic!("unexpected error {error}"),
        }
        kernel.assert_consistent();
    }
}
