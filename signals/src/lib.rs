/*!
Push channels used to wire the cardfeed components together.

- [`Broadcast`] multicasts every value to every live listener. Nothing is retained.
- [`Latest`] keeps the last value and replays it to listeners that ask for it.
- [`OneShot`] is set at most once; waiters and late listeners all observe that single value.

Listeners are either closures (called synchronously on the sending task) or channel senders,
in which case [`Subscription`] gives an async receiving end. Dropping the guard returned by
`listen` detaches the listener.

```rust
use cardfeed_signals::*;

let status = Latest::new();
status.set("open");
let _guard = status.listen_now(|value: &'static str| println!("status: {value}"));
status.set("close");
// status: open
// status: close
```
*/

mod broadcast;
mod latest;
mod once;
mod subscription;

pub use broadcast::*;
pub use latest::*;
pub use once::*;
pub use subscription::*;
