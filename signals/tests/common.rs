use std::sync::{Arc, Mutex};

#[allow(unused)]
pub fn change_watcher<T: Send + Sync + 'static>() -> (impl Fn(T) + Send + Sync + 'static, impl Fn() -> Vec<T>) {
    let changes = Arc::new(Mutex::new(Vec::new()));
    let watcher = {
        let changes = changes.clone();
        move |value: T| changes.lock().unwrap().push(value)
    };
    let check = move || changes.lock().unwrap().drain(..).collect::<Vec<T>>();
    (watcher, check)
}
