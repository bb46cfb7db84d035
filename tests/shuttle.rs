use shared_ptr::SharedPtr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

#[cfg(shuttle)]
use shuttle::thread;

#[cfg(not(shuttle))]
use std::thread;

const NUM_THREADS: usize = 3;
const NUM_ITERATIONS: usize = 1000;

struct Tracked(Arc<AtomicUsize>);

impl Drop for Tracked {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

fn check<F>(f: F)
where
    F: Fn() + Send + Sync + 'static,
{
    #[cfg(shuttle)]
    shuttle::check_random(f, NUM_ITERATIONS);

    #[cfg(not(shuttle))]
    for _ in 0..NUM_ITERATIONS {
        f();
    }
}

#[test]
fn shuttle_clone_and_drop() {
    check(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let ptr = SharedPtr::new(Tracked(drops.clone()));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let ptr = ptr.clone();
                thread::spawn(move || {
                    let copy = ptr.clone();
                    assert!(copy.use_count() >= 2);
                    drop(ptr);
                })
            })
            .collect();
        drop(ptr);

        for thread in threads {
            thread.join().unwrap();
        }
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn shuttle_racing_last_owners() {
    check(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let a = SharedPtr::new(Tracked(drops.clone()));
        let b = a.clone();

        let t1 = thread::spawn(move || drop(a));
        let t2 = thread::spawn(move || {
            let mut b = b;
            b.reset();
            assert!(b.is_empty());
        });
        t1.join().unwrap();
        t2.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn shuttle_racing_unwraps() {
    check(|| {
        let drops = Arc::new(AtomicUsize::new(0));
        let unwrapped = Arc::new(AtomicUsize::new(0));
        let ptr = SharedPtr::new(Tracked(drops.clone()));

        let threads: Vec<_> = (0..NUM_THREADS)
            .map(|_| {
                let ptr = ptr.clone();
                let unwrapped = unwrapped.clone();
                thread::spawn(move || {
                    if ptr.try_unwrap().is_ok() {
                        unwrapped.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        drop(ptr);

        for thread in threads {
            thread.join().unwrap();
        }
        assert!(unwrapped.load(Ordering::SeqCst) <= 1);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    });
}
