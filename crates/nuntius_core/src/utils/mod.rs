pub(crate) mod iter_join;
