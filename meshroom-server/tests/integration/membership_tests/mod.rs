mod test_host_leaves;
