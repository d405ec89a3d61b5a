//! Tests for error handling

use symdex_core::error::{Result, SymdexError};
use symdex_core::runtime::ExpressionResult;
use symdex_core::types::Address;

#[test]
fn test_invalid_argument_display()
{
    let error = SymdexError::InvalidArgument("test arg".to_string());
    let message = format!("{}", error);
    assert!(message.contains("Invalid argument"));
    assert!(message.contains("test arg"));
}

#[test]
fn test_memory_read_display()
{
    let error = SymdexError::MemoryRead {
        address: Address::new(0x1000),
        length: 8,
        details: "unmapped".to_string(),
    };
    let message = format!("{}", error);
    assert!(message.contains("0x0000000000001000"));
    assert!(message.contains("8 bytes"));
    assert!(message.contains("unmapped"));
}

#[test]
fn test_execution_failed_keeps_result_code()
{
    let error = SymdexError::ExecutionFailed {
        function: "__dispatch_queue_get_pending_items".to_string(),
        result: ExpressionResult::ThreadVanished,
    };
    let message = format!("{}", error);
    assert!(message.contains("__dispatch_queue_get_pending_items"));
    assert!(message.contains("thread vanished"));
}

#[test]
fn test_regex_error_conversion()
{
    let regex_err = regex::Regex::new("(").unwrap_err();
    let error: SymdexError = regex_err.into();
    match error {
        SymdexError::InvalidRegex(_) => {
            // Expected: regex errors convert to InvalidRegex
        }
        _ => panic!("Expected InvalidRegex variant"),
    }
}

#[test]
fn test_io_error_conversion()
{
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let error: SymdexError = io_err.into();
    let message = format!("{}", error);
    assert!(message.contains("IO error"));
    assert!(message.contains("no such file"));
}

#[test]
fn test_result_type()
{
    // Test that Result type is properly aliased
    let _result: Result<()> = Ok(());
    let _error_result: Result<()> = Err(SymdexError::ResourceExhausted("32 bytes".to_string()));
}
