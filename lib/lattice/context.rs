use serde::{Deserialize, Serialize};
use std::fmt;

/// The calling context a block is analyzed under.
///
/// A `Context` is a bounded call string: the indices of the most recent call
/// nodes, innermost last.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Context {
    call_string: Vec<usize>,
}

impl Context {
    /// The context of the program entry.
    pub fn main() -> Context {
        Context {
            call_string: Vec::new(),
        }
    }

    /// Create the context for a call made at `call_site` from this context,
    /// keeping at most `k` call sites.
    pub fn push(&self, call_site: usize, k: usize) -> Context {
        let mut call_string = self.call_string.clone();
        call_string.push(call_site);
        if call_string.len() > k {
            call_string.drain(0..call_string.len() - k);
        }
        Context { call_string }
    }

    pub fn call_string(&self) -> &[usize] {
        &self.call_string
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{}]",
            self.call_string
                .iter()
                .map(|site| site.to_string())
                .collect::<Vec<String>>()
                .join(",")
        )
    }
}

#[test]
fn context_push_is_bounded() {
    let context = Context::main().push(3, 2).push(7, 2).push(9, 2);
    assert_eq!(context.call_string(), &[7, 9]);
    assert_eq!(context.to_string(), "[7,9]");
    assert_eq!(Context::main().push(3, 0), Context::main());
}
