mod delegate;
mod resolver;

pub use delegate::Delegate;
pub use delegate::MockDelegate;
pub use delegate::NullDelegate;
pub use resolver::MockResolver;
pub use resolver::Resolution;
pub use resolver::Resolver;
