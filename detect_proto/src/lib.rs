tonic::include_proto!("object_detect");

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("object_detect");
