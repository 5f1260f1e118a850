//! In-process Debug Adapter Protocol server for shader runtimes.
//!
//! The crate has two halves. [`debugger`] is the host-facing model: the
//! runtime registers source files, binds its worker threads to
//! [`debugger::Thread`]s and reports execution through
//! `enter`/`update`/`exit`, publishing inspectable state into
//! [`debugger::VariableContainer`]s. [`dap`] serves that model to an IDE
//! over TCP, one DAP session per connection.
//!
//! ```no_run
//! use std::sync::Arc;
//! use shaderdap::dap::DapServer;
//! use shaderdap::debugger::{Constant, Context, Location};
//!
//! let ctx = Context::new();
//! let _server = DapServer::bind(
//!     Arc::clone(&ctx),
//!     ([127, 0, 0, 1], shaderdap::dap::DEFAULT_PORT).into(),
//! )?;
//!
//! let file = ctx.lock().create_virtual_file("quad.frag", "void main() { ... }");
//! let thread = ctx.current_thread();
//! {
//!     let mut lock = ctx.lock();
//!     thread.enter(&mut lock, &file, "main");
//! }
//! if let Some(locals) = thread.locals() {
//!     locals.put("x", Arc::new(Constant::new(1.0f32)));
//! }
//! thread.update(Location::new(Arc::clone(&file), 1));
//! thread.exit();
//! # Ok::<(), std::io::Error>(())
//! ```

pub mod dap;
pub mod debugger;
