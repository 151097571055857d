mod release_date;
mod repair;
mod resolver;
#[cfg(test)]
pub(crate) mod test_util;

pub use resolver::EntityResolver;
