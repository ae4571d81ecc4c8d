

#[cfg(feature = "redis-tokio")]
mod test_admission_script;
