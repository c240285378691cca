use seedsync_core::installer::is_binary_execution_failure;

#[test]
fn glibc_version_mismatch_triggers_portable_fallback() {
    assert!(is_binary_execution_failure(
        "scanfs: /lib64/libc.so.6: version `GLIBC_2.34' not found (required by scanfs)"
    ));
}

#[test]
fn wrong_architecture_triggers_portable_fallback() {
    assert!(is_binary_execution_failure("-bash: ./scanfs: cannot execute binary file: Exec format error"));
}

#[test]
fn ordinary_permission_errors_do_not_trigger_fallback() {
    assert!(!is_binary_execution_failure("bash: ./scanfs: Permission denied"));
}
