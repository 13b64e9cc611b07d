/// See [std::print]. Writes to the given console or UART.
#[macro_export]
macro_rules! uprint {
	($uart:expr, $($args:tt)+) => ({
			use core::fmt::Write;
			let _ = write!($uart, $($args)+);
	});
}

/// See [std::println]. Lines end in `\r\n`.
#[macro_export]
macro_rules! uprintln {
	($uart:expr) => ({
		$crate::uprint!($uart, "\r\n")
	});
	($uart:expr, $fmt:expr) => ({
		$crate::uprint!($uart, concat!($fmt, "\r\n"))
	});
	($uart:expr, $fmt:expr, $($args:tt)+) => ({
		$crate::uprint!($uart, concat!($fmt, "\r\n"), $($args)+)
	});
}
