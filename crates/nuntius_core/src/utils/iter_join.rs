use std::fmt::{Display, Write};

pub trait Join {
    /// Render every item with `Display`, separated by `sep`.
    fn join(self, sep: &str) -> String;
}

impl<I> Join for I
where
    I: Iterator,
    I::Item: Display,
{
    fn join(self, sep: &str) -> String {
        let mut joined = String::new();

        for (index, item) in self.enumerate() {
            if index > 0 {
                joined.push_str(sep);
            }
            // Writing into a String cannot fail.
            let _ = write!(joined, "{item}");
        }

        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_with_separator() {
        assert_eq!([1, 2, 3].iter().join(", "), "1, 2, 3");
        assert_eq!(std::iter::empty::<u8>().join(", "), "");
    }
}
