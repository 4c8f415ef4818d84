use super::*;
use crate::{kernel::tests::*, wait::Begin};

#[test]
fn init_bounds() {
    let kernel = kernel();
    let sem = kernel.sem_init(SEM_VALUE_MAX as u32).unwrap();
    assert_eq!(kernel.get_value(sem), Ok(SEM_VALUE_MAX));
    assert_eq!(
        kernel.sem_init(SEM_VALUE_MAX as u32 + 1),
        Err(Error::InvalidArgument)
    );
    assert_eq!(kernel.sem_init(u32::MAX), Err(Error::InvalidArgument));
    assert_eq!(kernel.get_protocol(sem), Ok(Protocol::None));
}

#[test]
fn init_then_n_waits() {
    let _trace = crate::util::test::trace_init();
    let kernel = kernel();
    let task = kernel.task_create(prio(1)).unwrap();
    let sem = kernel.sem_init(3).unwrap();

    for expected in (0..3).rev() {
        kernel.wait(sem, task).unwrap();
        assert_eq!(kernel.get_value(sem), Ok(expected));
    }
    assert_eq!(kernel.trywait(sem, task), Err(Error::WouldBlock));
    assert_eq!(kernel.get_value(sem), Ok(0));
}

#[test]
fn destroy_busy() {
    let kernel = kernel();
    let holder = kernel.task_create(prio(1)).unwrap();
    let waiter = kernel.task_create(prio(1)).unwrap();
    let sem = kernel.sem_init(1).unwrap();
    kernel.set_protocol(sem, Protocol::Inherit).unwrap();

    kernel.trywait(sem, holder).unwrap();
    assert_eq!(kernel.sem_destroy(sem), Err(Error::Busy));
    kernel.begin_wait(sem, waiter).unwrap();
    assert_eq!(kernel.sem_destroy(sem), Err(Error::Busy));

    kernel.post(sem, Some(holder)).unwrap();
    kernel.post(sem, Some(waiter)).unwrap();
    assert_eq!(kernel.sem_destroy(sem), Ok(()));
    assert_eq!(kernel.sem_destroy(sem), Err(Error::InvalidArgument));
}

#[test]
fn destroyed_ids_are_reused() {
    let kernel = kernel();
    let a = kernel.sem_init(0).unwrap();
    let b = kernel.sem_init(5).unwrap();
    kernel.sem_destroy(a).unwrap();
    let c = kernel.sem_init(2).unwrap();
    assert_eq!(a, c);
    assert_eq!(kernel.get_value(c), Ok(2));
    assert_eq!(kernel.get_value(b), Ok(5));
}

#[test]
fn protocol_changes() {
    let kernel = kernel();
    let task = kernel.task_create(prio(1)).unwrap();
    let waiter = kernel.task_create(prio(1)).unwrap();
    let sem = kernel.sem_init(1).unwrap();
    let ceiling = Protocol::Protect { ceiling: prio(7) };

    kernel.set_protocol(sem, Protocol::Inherit).unwrap();
    kernel.set_protocol(sem, ceiling).unwrap();
    assert_eq!(kernel.get_protocol(sem), Ok(ceiling));

    // held: only a no-op change is allowed.
    kernel.trywait(sem, task).unwrap();
    assert_eq!(
        kernel.set_protocol(sem, Protocol::Inherit),
        Err(Error::InvalidArgument)
    );
    assert_eq!(kernel.set_protocol(sem, ceiling), Ok(()));
    kernel.post(sem, Some(task)).unwrap();

    // waited on, without tracked holders.
    kernel.set_protocol(sem, Protocol::None).unwrap();
    kernel.trywait(sem, task).unwrap();
    kernel.begin_wait(sem, waiter).unwrap();
    assert_eq!(
        kernel.set_protocol(sem, Protocol::Inherit),
        Err(Error::InvalidArgument)
    );
}

#[test]
fn reset_wakes_waiters() {
    let _trace = crate::util::test::trace_init();
    let kernel = kernel();
    let a = kernel.task_create(prio(1)).unwrap();
    let b = kernel.task_create(prio(1)).unwrap();
    let sem = kernel.sem_init(0).unwrap();

    assert_eq!(kernel.begin_wait(sem, a), Ok(Begin::Blocked));
    assert_eq!(kernel.begin_wait(sem, b), Ok(Begin::Blocked));
    assert_eq!(kernel.get_value(sem), Ok(-2));

    kernel.reset(sem, 3).unwrap();
    assert_eq!(kernel.get_value(sem), Ok(3));
    assert_eq!(kernel.scheduler().take_unblocked(), vec![a, b]);
    assert_eq!(kernel.outcome(a), Some(Err(Error::Reset)));
    assert_eq!(kernel.outcome(b), Some(Err(Error::Reset)));
    assert_eq!(kernel.wait_state(a), Ok(crate::WaitState::Running));
    kernel.assert_consistent();

    // the waiters didn't acquire anything, so all 3 units are there to take.
    for task in [a, b, a] {
        kernel.trywait(sem, task).unwrap();
    }
    assert_eq!(kernel.trywait(sem, b), Err(Error::WouldBlock));
}

#[test]
fn reset_restores_holders() {
    let kernel = kernel();
    let low = kernel.task_create(prio(2)).unwrap();
    let high = kernel.task_create(prio(9)).unwrap();
    let sem = kernel.sem_init(1).unwrap();
    kernel.set_protocol(sem, Protocol::Inherit).unwrap();

    kernel.trywait(sem, low).unwrap();
    kernel.begin_wait(sem, high).unwrap();
    assert_eq!(kernel.prio(low), 9);

    kernel.reset(sem, 0).unwrap();
    assert_eq!(kernel.prio(low), 2);
    assert_eq!(kernel.outcome(high), Some(Err(Error::Reset)));
    // `low` still holds the semaphore.
    assert_eq!(kernel.holds(sem, low), 1);
    kernel.assert_consistent();
}

#[test]
fn reset_rejects_large_values() {
    let kernel = kernel();
    let sem = kernel.sem_init(1).unwrap();
    assert_eq!(
        kernel.reset(sem, SEM_VALUE_MAX as u32 + 1),
        Err(Error::InvalidArgument)
    );
    assert_eq!(kernel.get_value(sem), Ok(1));
}

#[test]
fn grant_order() {
    let _trace = crate::util::test::trace_init();
    let kernel = kernel();
    let first = kernel.task_create(prio(3)).unwrap();
    let urgent = kernel.task_create(prio(7)).unwrap();
    let second = kernel.task_create(prio(3)).unwrap();
    let sem = kernel.sem_init(0).unwrap();

    for task in [first, urgent, second] {
        kernel.begin_wait(sem, task).unwrap();
    }
    assert_eq!(kernel.waiters(sem), vec![first, urgent, second]);

    for expected in [urgent, first, second] {
        kernel.post(sem, None).unwrap();
        assert_eq!(kernel.scheduler().take_unblocked(), vec![expected]);
        assert_eq!(kernel.outcome(expected), Some(Ok(())));
    }
    assert_eq!(kernel.get_value(sem), Ok(0));
}
