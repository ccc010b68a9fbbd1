mod tests_bkd;
