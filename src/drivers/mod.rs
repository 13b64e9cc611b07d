pub mod hpm_uart;
