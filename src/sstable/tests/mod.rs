mod tests_scan;
