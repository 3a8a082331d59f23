#![allow(dead_code)]

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
};

use ash::{prelude::VkResult, vk};
use rhyolite_pool::{CommandDevice, PipelineDevice, QueueClass, TimelineDevice, TimelineValue};

const LIBRARY_MAGIC: &[u8; 4] = b"MLIB";

#[derive(Debug, PartialEq, Eq)]
pub struct MockBlock {
    pub queue: QueueClass,
    pub resets: u32,
}

#[derive(Debug, PartialEq, Eq)]
pub struct MockPipeline {
    pub name: String,
    pub from_library: bool,
}

/// A name-addressable library. Serializes as the magic followed by newline-separated names.
#[derive(Debug, Default)]
pub struct MockLibrary {
    pub names: BTreeMap<String, ()>,
}

#[derive(Debug, Clone)]
pub struct MockDesc {
    pub name: String,
}
impl MockDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
        }
    }
}

/// An in-process device with a host-driven timeline.
#[derive(Default)]
pub struct MockDevice {
    completed: AtomicU64,
    pub builds: AtomicUsize,
    pub blocks_created: AtomicUsize,
    pub idle_waits: AtomicUsize,
    pub fail_builds: AtomicBool,
    pub reject_libraries: AtomicBool,
    pub fail_serialize: AtomicBool,
    pub last_build_had_library: Mutex<Option<bool>>,
}

impl MockDevice {
    pub fn set_completed(&self, value: u64) {
        self.completed.store(value, Ordering::SeqCst);
    }
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
    fn build(&self, name: &str, library: Option<&MockLibrary>) -> VkResult<MockPipeline> {
        *self.last_build_had_library.lock().unwrap() = Some(library.is_some());
        if self.fail_builds.load(Ordering::SeqCst) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(MockPipeline {
            name: name.to_owned(),
            from_library: false,
        })
    }
}

impl CommandDevice for MockDevice {
    type CommandBlock = MockBlock;

    fn create_command_block(&self, queue: QueueClass) -> VkResult<MockBlock> {
        self.blocks_created.fetch_add(1, Ordering::SeqCst);
        Ok(MockBlock { queue, resets: 0 })
    }
    fn reset_command_block(&self, block: &mut MockBlock) -> VkResult<()> {
        block.resets += 1;
        Ok(())
    }
}

impl PipelineDevice for MockDevice {
    type Pipeline = MockPipeline;
    type Library = MockLibrary;
    type GraphicsDesc = MockDesc;
    type ComputeDesc = MockDesc;

    fn create_library(&self, initial_data: Option<&[u8]>) -> VkResult<MockLibrary> {
        let mut library = MockLibrary::default();
        let Some(data) = initial_data else {
            return Ok(library);
        };
        if self.reject_libraries.load(Ordering::SeqCst) || !data.starts_with(LIBRARY_MAGIC) {
            return Err(vk::Result::ERROR_INCOMPATIBLE_DRIVER);
        }
        let body = std::str::from_utf8(&data[LIBRARY_MAGIC.len()..])
            .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        for name in body.lines().filter(|line| !line.is_empty()) {
            library.names.insert(name.to_owned(), ());
        }
        Ok(library)
    }
    fn serialize_library(&self, library: &MockLibrary) -> VkResult<Vec<u8>> {
        if self.fail_serialize.load(Ordering::SeqCst) {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let mut data = LIBRARY_MAGIC.to_vec();
        for name in library.names.keys() {
            data.extend_from_slice(name.as_bytes());
            data.push(b'\n');
        }
        Ok(data)
    }
    fn load_pipeline(&self, library: &MockLibrary, name: &str) -> Option<MockPipeline> {
        library.names.contains_key(name).then(|| MockPipeline {
            name: name.to_owned(),
            from_library: true,
        })
    }
    fn store_pipeline(
        &self,
        library: &mut MockLibrary,
        name: &str,
        _pipeline: &MockPipeline,
    ) -> VkResult<()> {
        library.names.insert(name.to_owned(), ());
        Ok(())
    }
    fn build_graphics(
        &self,
        desc: &MockDesc,
        library: Option<&MockLibrary>,
    ) -> VkResult<MockPipeline> {
        self.build(&desc.name, library)
    }
    fn build_compute(
        &self,
        desc: &MockDesc,
        library: Option<&MockLibrary>,
    ) -> VkResult<MockPipeline> {
        self.build(&desc.name, library)
    }
}

impl TimelineDevice for MockDevice {
    fn completed_value(&self) -> VkResult<TimelineValue> {
        Ok(TimelineValue(self.completed.load(Ordering::SeqCst)))
    }
    fn wait_idle(&self) -> VkResult<()> {
        self.idle_waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
