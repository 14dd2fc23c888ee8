pub mod classifier_pool;
