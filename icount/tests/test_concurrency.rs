use icount::domain::Address;
use icount::profiling::{Session, SessionConfig};
use std::thread;

const THREADS: u64 = 8;
const ITERATIONS: u64 = 10_000;

fn small_buffer_session() -> Session {
    Session::init(SessionConfig { buffer_capacity: 7, ..SessionConfig::default() }).unwrap()
}

#[test]
fn test_racy_counter_never_overcounts() {
    let session = Session::init(SessionConfig::default()).unwrap();
    let group =
        session.on_region_discovered(&[(Address(0x1000), 4), (Address(0x1004), 2)]).unwrap();

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let group = &group;
            scope.spawn(move || {
                for _ in 0..ITERATIONS {
                    group.counter().increment();
                }
            });
        }
    });

    let stats = session.flush_all_groups().unwrap();
    assert!(stats.executions > 0);
    assert!(stats.executions <= THREADS * ITERATIONS);

    // Every member receives the same increment
    let a = session.registry().lookup(Address(0x1000)).unwrap().exec_count;
    let b = session.registry().lookup(Address(0x1004)).unwrap().exec_count;
    assert_eq!(a, stats.executions);
    assert_eq!(a, b);
}

#[test]
fn test_racy_counter_is_exact_on_one_thread() {
    let session = Session::init(SessionConfig::default()).unwrap();
    let group = session.on_region_discovered(&[(Address(0x1000), 4)]).unwrap();

    for _ in 0..ITERATIONS {
        group.counter().increment();
    }

    assert_eq!(session.flush_all_groups().unwrap().executions, ITERATIONS);
    assert_eq!(group.counter().get(), 0);
    assert_eq!(session.registry().lookup(Address(0x1000)).unwrap().exec_count, ITERATIONS);
}

#[test]
fn test_second_flush_adds_nothing() {
    let session = Session::init(SessionConfig::default()).unwrap();
    let group =
        session.on_region_discovered(&[(Address(0x1000), 4), (Address(0x1004), 2)]).unwrap();
    for _ in 0..5 {
        group.counter().increment();
    }

    session.flush_all_groups().unwrap();
    let again = session.flush_all_groups().unwrap();

    assert_eq!(again.executions, 0);
    assert_eq!(session.registry().lookup(Address(0x1000)).unwrap().exec_count, 5);
    assert_eq!(session.registry().lookup(Address(0x1004)).unwrap().exec_count, 5);
}

#[test]
fn test_trace_buffers_are_exact_across_threads() {
    let session = small_buffer_session();
    let addresses = [(Address(0x10), 1), (Address(0x11), 3), (Address(0x14), 2)];

    thread::scope(|scope| {
        for _ in 0..THREADS {
            let session = &session;
            scope.spawn(move || {
                let mut ctx = session.on_thread_start().unwrap();
                for i in 0..ITERATIONS {
                    let (address, size) = addresses[(i % 3) as usize];
                    ctx.record_event(address, size).unwrap();
                }
                session.on_thread_end(ctx).unwrap();
            });
        }
    });

    assert_eq!(session.drained_events(), THREADS * ITERATIONS);
    assert_eq!(session.live_threads(), 0);
    assert_eq!(session.registry().total_executions(), THREADS * ITERATIONS);

    // 10_000 = 3 * 3333 + 1, the extra event lands on the first address
    let per_thread_first = ITERATIONS / 3 + 1;
    assert_eq!(
        session.registry().lookup(Address(0x10)).unwrap().exec_count,
        THREADS * per_thread_first
    );
}

#[test]
fn test_dropped_context_still_drains() {
    let session = small_buffer_session();

    thread::scope(|scope| {
        scope.spawn(|| {
            let mut ctx = session.on_thread_start().unwrap();
            for _ in 0..10 {
                ctx.record_event(Address(0x20), 4).unwrap();
            }
            // Thread exits without calling on_thread_end
        });
    });

    assert_eq!(session.live_threads(), 0);
    assert_eq!(session.drained_events(), 10);
    assert_eq!(session.registry().lookup(Address(0x20)).unwrap().exec_count, 10);
}

#[test]
fn test_groups_and_buffers_combine() {
    let session = small_buffer_session();
    let group = session.on_region_discovered(&[(Address(0x1000), 4)]).unwrap();
    for _ in 0..3 {
        group.counter().increment();
    }

    let mut ctx = session.on_thread_start().unwrap();
    ctx.record_event(Address(0x1000), 4).unwrap();
    session.on_thread_end(ctx).unwrap();

    let report = session.shutdown().unwrap();
    assert_eq!(report.total_executions, 4);
    assert_eq!(report.unique_instructions, 1);
}
