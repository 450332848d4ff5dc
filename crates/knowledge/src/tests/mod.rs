mod index_pipeline;
